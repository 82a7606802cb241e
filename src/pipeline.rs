//! Build pipeline
//!
//! `Partitioning → Building → Verifying (→ Building)* → Merging → Finalizing`
//!
//! Each phase is a barrier: no merge starts before every partition verifies,
//! and no table is published before the merge returns. Building and verifying
//! never fail the run (they retry, forever by default); only merging and
//! finalizing can end in `Failed`.
//!
//! Merge output goes to a scoped scratch directory created fresh for each run
//! and removed when the run ends, whatever the outcome.

use crate::build::{
    build_all, CommandPartitionBuilder, JobRunner, LocalPartitionBuilder, PartitionBuilder,
};
use crate::config::{Collaborator, PipelineConfig};
use crate::error::PipelineError;
use crate::finalize::{finalize, TableCheck};
use crate::merge::{CommandMerger, KWayMerger, Merger};
use crate::partition::{plan_partitions, Partition};
use crate::table::{append_to_path, TableMeta, TABLE_SUFFIX};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Name of the merged table inside the scratch directory
const SCRATCH_TABLE: &str = "out.table.bin";

/// Name prefix of per-run scratch directories
const SCRATCH_PREFIX: &str = ".sabuild-merge-";

/// Pipeline phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Partitioning,
    Building,
    Verifying,
    Merging,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Partitioning => "partitioning",
            Stage::Building => "building",
            Stage::Verifying => "verifying",
            Stage::Merging => "merging",
            Stage::Finalizing => "finalizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Published table
    pub output: PathBuf,
    /// Metadata sidecar next to the table
    pub meta_path: PathBuf,
    /// Corpus length in bytes
    pub data_size: u64,
    /// Partitions in merge order
    pub partitions: Vec<Partition>,
    /// Retry waves issued by the verifier
    pub retry_waves: u32,
    /// Build attempts per partition
    pub attempts: Vec<u32>,
    /// Bytes per suffix index in the published table
    pub index_width: usize,
    /// Stages in the order they were entered, ending with `Done`
    pub stages: Vec<Stage>,
}

/// Default output path: `<data_file>.table.bin`
pub fn default_output_path(data_file: &Path) -> PathBuf {
    append_to_path(data_file, TABLE_SUFFIX)
}

/// Coordinates one build of a global suffix table
pub struct Pipeline {
    config: PipelineConfig,
    builder: Box<dyn PartitionBuilder>,
    merger: Box<dyn Merger>,
    show_progress: bool,
}

impl Pipeline {
    /// Create a pipeline with the collaborators named in `config`
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let builder: Box<dyn PartitionBuilder> = match &config.builder {
            Collaborator::CurrentExe => Box::new(
                CommandPartitionBuilder::current_exe()
                    .map_err(PipelineError::io(Path::new("."), "locate current executable"))?,
            ),
            Collaborator::InProcess => Box::new(LocalPartitionBuilder),
            Collaborator::Program(program) => Box::new(CommandPartitionBuilder::new(program)),
        };

        let merger: Box<dyn Merger> = match &config.merger {
            Collaborator::CurrentExe => Box::new(
                CommandMerger::current_exe()
                    .map_err(PipelineError::io(Path::new("."), "locate current executable"))?,
            ),
            Collaborator::InProcess => Box::new(KWayMerger),
            Collaborator::Program(program) => Box::new(CommandMerger::new(program)),
        };

        Ok(Self::with_collaborators(config, builder, merger))
    }

    /// Create a pipeline with explicit collaborators
    pub fn with_collaborators(
        config: PipelineConfig,
        builder: Box<dyn PartitionBuilder>,
        merger: Box<dyn Merger>,
    ) -> Self {
        Self {
            config,
            builder,
            merger,
            show_progress: false,
        }
    }

    /// Draw progress bars for build waves
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the suffix table of `data_file` and publish it at `output`
    pub fn run(&self, data_file: &Path, output: &Path) -> Result<RunReport, PipelineError> {
        match self.execute(data_file, output) {
            Ok(mut report) => {
                log::info!("Stage: {}", Stage::Done);
                report.stages.push(Stage::Done);
                Ok(report)
            }
            Err(err) => {
                log::error!("Stage: {} ({})", Stage::Failed, err);
                Err(err)
            }
        }
    }

    fn execute(&self, data_file: &Path, output: &Path) -> Result<RunReport, PipelineError> {
        self.config.validate()?;
        let started = SystemTime::now();
        let mut stages = Vec::new();

        enter(&mut stages, Stage::Partitioning);
        let (data_size, partitions) =
            plan_partitions(data_file, self.config.total_jobs, self.config.overlap)?;
        log::info!(
            "Partitioning {} ({} bytes) into {} partitions with {} bytes of overlap",
            data_file.display(),
            data_size,
            partitions.len(),
            self.config.overlap
        );

        let runner = JobRunner::new(self.config.jobs_at_once)?.with_progress(self.show_progress);
        let build = build_all(
            &runner,
            self.builder.as_ref(),
            data_file,
            &partitions,
            &self.config.retry_policy(),
        )?;
        stages.extend(build.stages);

        enter(&mut stages, Stage::Merging);
        let scratch_dir = self.scratch_dir(output, started)?;
        let scratch_table = scratch_dir.path().join(SCRATCH_TABLE);
        let threads = self.config.effective_merge_threads();
        log::info!(
            "Merging {} partition tables into {} ({} threads)",
            partitions.len(),
            scratch_table.display(),
            threads
        );
        self.merger
            .merge(&partitions, &scratch_table, threads)
            .map_err(|source| PipelineError::Merge {
                tables: partitions.len(),
                source,
            })?;

        enter(&mut stages, Stage::Finalizing);
        log::info!("Finalizing table at {}", output.display());
        let check = TableCheck::new(data_size, self.config.index_width);
        let index_width = finalize(&scratch_table, output, &check)?;

        let meta = TableMeta::new(index_width, data_size, partitions.len());
        let meta_path = meta
            .write(output)
            .map_err(PipelineError::io(output, "write table metadata"))?;

        log::info!(
            "Suffix array built: {} ({} suffixes, {} bytes each)",
            output.display(),
            data_size,
            index_width
        );

        Ok(RunReport {
            output: output.to_path_buf(),
            meta_path,
            data_size,
            partitions,
            retry_waves: build.retry_waves,
            attempts: build.attempts,
            index_width,
            stages,
        })
    }

    /// Fresh scratch directory for this run
    ///
    /// Defaults to the output's directory so the final rename stays on one
    /// filesystem. Scratch directories of earlier runs that never cleaned up
    /// are removed first.
    fn scratch_dir(
        &self,
        output: &Path,
        started: SystemTime,
    ) -> Result<tempfile::TempDir, PipelineError> {
        let parent = match &self.config.scratch_dir {
            Some(dir) => dir.clone(),
            None => match output.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };

        fs::create_dir_all(&parent)
            .map_err(PipelineError::io(&parent, "create scratch parent"))?;
        sweep_stale_scratch(&parent, started);

        tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&parent)
            .map_err(PipelineError::io(&parent, "create scratch directory"))
    }
}

/// Remove scratch directories in `parent` last modified before `started`
///
/// A killed or aborted run leaves its scratch directory behind, possibly with
/// a full-size table inside. Returns the number of directories removed.
fn sweep_stale_scratch(parent: &Path, started: SystemTime) -> usize {
    let Ok(entries) = fs::read_dir(parent) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX) {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|meta| Ok(meta.is_dir() && meta.modified()? < started))
            .unwrap_or(false);
        if !stale {
            continue;
        }

        let path = entry.path();
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                log::warn!("Removed stale scratch directory {}", path.display());
                removed += 1;
            }
            Err(e) => log::warn!(
                "Could not remove stale scratch directory {}: {}",
                path.display(),
                e
            ),
        }
    }
    removed
}

/// Log a stage transition and append it to `trace`
pub(crate) fn enter(trace: &mut Vec<Stage>, stage: Stage) {
    log::debug!("Stage: {}", stage);
    trace.push(stage);
}
