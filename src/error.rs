//! Error types for the build pipeline.
//!
//! Library code returns [`PipelineError`]; the binary wraps it in
//! `anyhow::Error` and maps it back to an exit status with
//! [`PipelineError::exit_code`].
//!
//! Partition build failures never show up here: they are transient, logged,
//! and retried by the verifier. Only merge and final validation failures are
//! fatal.

use crate::merge::MergeError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exit status for fatal errors without a dedicated code
pub const EXIT_FAILURE: i32 = 1;
/// Exit status when the merger reports failure
pub const EXIT_MERGE_FAILURE: i32 = 2;
/// Exit status when the published table fails validation
pub const EXIT_VALIDATION_FAILURE: i32 = 3;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid parameters
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The corpus has no bytes, so no table size can be valid
    #[error("corpus '{}' is empty", .0.display())]
    EmptyCorpus(PathBuf),

    /// I/O error with path context
    #[error("I/O error during {operation} on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// A retry cap was configured and some partitions still fail
    #[error("{failed} partition(s) still failing after {waves} retry wave(s)")]
    RetriesExhausted { failed: usize, waves: u32 },

    /// The merger signalled failure
    #[error(
        "merge of {tables} partition tables failed: {source}. \
         The merger opens every partition table at once; \
         ensure the open file limit (ulimit -Sn) is sufficient"
    )]
    Merge {
        tables: usize,
        #[source]
        source: MergeError,
    },

    /// The merged table is missing or its size is inconsistent with the corpus
    #[error("output table '{}' is invalid: {reason}", .path.display())]
    FinalValidation { path: PathBuf, reason: String },
}

impl PipelineError {
    /// Build a closure that wraps an `io::Error` with path context
    pub(crate) fn io(path: &Path, operation: &'static str) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| PipelineError::Io {
            path,
            operation,
            source,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Merge { .. } => EXIT_MERGE_FAILURE,
            PipelineError::FinalValidation { .. } => EXIT_VALIDATION_FAILURE,
            _ => EXIT_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let merge = PipelineError::Merge {
            tables: 4,
            source: MergeError::Io(io::Error::other("boom")),
        };
        assert_eq!(merge.exit_code(), EXIT_MERGE_FAILURE);

        let validation = PipelineError::FinalValidation {
            path: PathBuf::from("out.table.bin"),
            reason: "size 7 is not a multiple of 3".into(),
        };
        assert_eq!(validation.exit_code(), EXIT_VALIDATION_FAILURE);

        assert_eq!(PipelineError::Config("x".into()).exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_merge_error_mentions_file_limit() {
        let err = PipelineError::Merge {
            tables: 16,
            source: MergeError::Io(io::Error::other("too many open files")),
        };
        let message = err.to_string();
        assert!(message.contains("ulimit -Sn"));
        assert!(message.contains("16 partition tables"));
    }

    #[test]
    fn test_io_context() {
        let err = PipelineError::io(Path::new("/data/corpus"), "stat")(io::Error::new(
            io::ErrorKind::NotFound,
            "missing",
        ));
        assert_eq!(
            err.to_string(),
            "I/O error during stat on '/data/corpus': missing"
        );
    }
}
