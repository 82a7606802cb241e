//! Partition builder that runs one worker process per attempt
//!
//! The worker is invoked as
//! `<program> make-part --data-file <F> --start-byte <S> --end-byte <E>`
//! and must write the slice and table named by [`Partition::new`].

use super::{BuildError, PartitionBuilder};
use crate::partition::Partition;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Spawns `<program> make-part ...` and waits for it to exit
#[derive(Debug, Clone)]
pub struct CommandPartitionBuilder {
    program: PathBuf,
}

impl CommandPartitionBuilder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use the running executable's own `make-part` subcommand
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, data_file: &Path, partition: &Partition) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("make-part")
            .arg("--data-file")
            .arg(data_file)
            .arg("--start-byte")
            .arg(partition.start.to_string())
            .arg("--end-byte")
            .arg(partition.end.to_string());
        cmd
    }
}

impl PartitionBuilder for CommandPartitionBuilder {
    fn build(&self, data_file: &Path, partition: &Partition) -> Result<PathBuf, BuildError> {
        let mut cmd = self.command(data_file, partition);
        log::debug!("{:?}", cmd);

        // Collects stdout and stderr until EOF, then waits for exit
        let output = cmd.output().map_err(|source| BuildError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BuildError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(partition.table_file.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let builder = CommandPartitionBuilder::new("/opt/bin/worker");
        let partition = Partition::new(Path::new("/data/c.bin"), 100, 250);
        let cmd = builder.command(Path::new("/data/c.bin"), &partition);

        assert_eq!(cmd.get_program(), "/opt/bin/worker");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "make-part",
                "--data-file",
                "/data/c.bin",
                "--start-byte",
                "100",
                "--end-byte",
                "250"
            ]
        );
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let builder = CommandPartitionBuilder::new("/nonexistent/sabuild-worker");
        let partition = Partition::new(Path::new("/data/c.bin"), 0, 10);

        let err = builder.build(Path::new("/data/c.bin"), &partition).unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_error() {
        let builder = CommandPartitionBuilder::new("false");
        let partition = Partition::new(Path::new("/data/c.bin"), 0, 10);

        let err = builder.build(Path::new("/data/c.bin"), &partition).unwrap_err();
        assert!(matches!(err, BuildError::Exit { .. }));
    }
}
