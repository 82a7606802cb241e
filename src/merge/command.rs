//! Merger that runs a worker process
//!
//! The worker is invoked as
//! `<program> merge --output-file <O> --suffix-path <slice>... --num-threads <N>`
//! with one `--suffix-path` per partition, in partition order. Each table is
//! found next to its slice as `<slice>.table.bin`.

use super::{MergeError, Merger};
use crate::partition::Partition;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone)]
pub struct CommandMerger {
    program: PathBuf,
}

impl CommandMerger {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use the running executable's own `merge` subcommand
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    fn command(&self, partitions: &[Partition], output: &Path, threads: usize) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("merge").arg("--output-file").arg(output);
        for partition in partitions {
            cmd.arg("--suffix-path").arg(&partition.source_range_file);
        }
        cmd.arg("--num-threads").arg(threads.to_string());
        cmd
    }
}

impl Merger for CommandMerger {
    fn merge(
        &self,
        partitions: &[Partition],
        output: &Path,
        threads: usize,
    ) -> Result<(), MergeError> {
        let mut cmd = self.command(partitions, output, threads);
        log::debug!("{:?}", cmd);

        let output = cmd.output().map_err(|source| MergeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(MergeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
