//! Merging partition tables into one global table
//!
//! - `kway`: in-process parallel k-way merge over memory-mapped partitions
//! - `command`: merger that spawns a worker process
//!
//! Mergers receive partitions in ascending start order, overlaps included;
//! deciding which partition owns a suffix in an overlap is the merger's job.

pub mod command;
pub mod kway;

pub use command::CommandMerger;
pub use kway::{merge_slices, KWayMerger};

use crate::partition::Partition;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Combines partition tables into one sorted table
pub trait Merger: Send + Sync {
    /// Merge the tables of `partitions` (ascending start order) into `output`
    fn merge(
        &self,
        partitions: &[Partition],
        output: &Path,
        threads: usize,
    ) -> Result<(), MergeError>;
}

/// Why a merge failed
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("merger exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("invalid merge input: {0}")]
    Input(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
