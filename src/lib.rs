//! # sabuild - Partitioned suffix array builder
//!
//! Builds one global suffix array over a corpus too large to index in a
//! single pass:
//!
//! 1. **Partition** the corpus into overlapping byte ranges
//! 2. **Build** a partial suffix table per range, in waves of bounded size
//! 3. **Verify** every partition and rebuild failures until all pass
//! 4. **Merge** the partial tables, in partition order, into one table
//! 5. **Finalize**: validate the table's size against the corpus and publish it
//!
//! ## Architecture
//!
//! - [`partition`] - Range planning and partition artifact naming
//! - [`build`] - Partition builders, the wave runner and the verify/retry loop
//! - [`merge`] - Table mergers (in-process k-way merge or worker process)
//! - [`finalize`] - Validation and atomic publishing of the merged table
//! - [`pipeline`] - Phase orchestration
//! - [`table`] - Fixed-width table encoding and the metadata sidecar
//! - [`config`] - JSON configuration with defaults
//!
//! ## Quick Start
//!
//! ```no_run
//! use sabuild::build::LocalPartitionBuilder;
//! use sabuild::config::PipelineConfig;
//! use sabuild::merge::KWayMerger;
//! use sabuild::pipeline::{default_output_path, Pipeline};
//! use std::path::Path;
//!
//! let data = Path::new("/data/corpus.bin");
//! let pipeline = Pipeline::with_collaborators(
//!     PipelineConfig::default(),
//!     Box::new(LocalPartitionBuilder),
//!     Box::new(KWayMerger),
//! );
//!
//! let report = pipeline.run(data, &default_output_path(data)).unwrap();
//! println!("{} suffixes, {} bytes each", report.data_size, report.index_width);
//! ```

pub mod build;
pub mod config;
pub mod error;
pub mod finalize;
pub mod logging;
pub mod merge;
pub mod output;
pub mod partition;
pub mod pipeline;
pub mod table;
pub mod utils;

pub use error::PipelineError;
pub use pipeline::{Pipeline, RunReport};
