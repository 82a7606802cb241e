//! Corpus partitioning
//!
//! - `planner`: computes overlapping byte ranges covering the corpus
//! - `types`: the `Partition` type and its artifact naming

pub mod planner;
pub mod types;

pub use planner::{plan_partitions, PartitionPlan};
pub use types::{slice_path, Partition};
