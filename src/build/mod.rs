//! Partition building
//!
//! ## Architecture
//!
//! - `local`: in-process partition builder (divsufsort)
//! - `command`: partition builder that spawns a worker process per attempt
//! - `runner`: runs builders in barrier-separated waves of bounded size
//! - `verify`: success predicate and the retry loop
//!
//! A [`PartitionBuilder`] reports an explicit result, but the coordinator
//! trusts only the files it finds afterwards: an `Ok` with a missing or empty
//! table still counts as a failed attempt.

pub mod command;
pub mod local;
pub mod runner;
pub mod verify;

pub use command::CommandPartitionBuilder;
pub use local::{build_suffix_array, make_part, LocalPartitionBuilder, MAX_PARTITION_LEN};
pub use runner::{JobResult, JobRunner};
pub use verify::{build_all, partition_is_valid, BuildReport, RetryPolicy, Verifier};

use crate::partition::Partition;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Builds the range slice and suffix table of one partition
///
/// Implementations must be idempotent: the same partition may be built again
/// after a failed attempt and must overwrite any partial output.
pub trait PartitionBuilder: Send + Sync {
    /// Build `partition` of `data_file`, returning the table path on success
    fn build(&self, data_file: &Path, partition: &Partition) -> Result<PathBuf, BuildError>;
}

/// Why a partition build attempt failed
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("builder exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("invalid range {start}-{end} for a corpus of {data_size} bytes")]
    Range { start: u64, end: u64, data_size: u64 },

    #[error("partition of {len} bytes exceeds the {max}-byte limit; raise total_jobs")]
    TooLarge { len: u64, max: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}
