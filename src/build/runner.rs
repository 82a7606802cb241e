//! Wave-based job runner
//!
//! Partitions are built in waves of at most `jobs_at_once`. Every job of a
//! wave runs on a dedicated rayon pool and the runner returns only after the
//! whole wave has finished, so waves are separated by a barrier. There is no
//! timeout: a hung builder stalls its wave.

use super::{BuildError, PartitionBuilder};
use crate::error::PipelineError;
use crate::partition::Partition;
use crate::utils::progress::wave_bar;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Outcome of one build attempt
#[derive(Debug)]
pub struct JobResult {
    /// Index of the partition in the planned sequence
    pub index: usize,
    pub outcome: Result<PathBuf, BuildError>,
}

impl JobResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs partition builds with bounded parallelism
pub struct JobRunner {
    pool: rayon::ThreadPool,
    jobs_at_once: usize,
    show_progress: bool,
}

impl JobRunner {
    pub fn new(jobs_at_once: usize) -> Result<Self, PipelineError> {
        if jobs_at_once == 0 {
            return Err(PipelineError::Config("jobs_at_once must be at least 1".into()));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs_at_once)
            .thread_name(|i| format!("sabuild-job-{i}"))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to start job pool: {e}")))?;

        Ok(Self {
            pool,
            jobs_at_once,
            show_progress: false,
        })
    }

    /// Draw a progress bar per wave
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn jobs_at_once(&self) -> usize {
        self.jobs_at_once
    }

    /// Build `partitions[i]` for every `i` in `indices`, wave by wave
    ///
    /// Results come back in the order of `indices`.
    pub fn run(
        &self,
        builder: &dyn PartitionBuilder,
        data_file: &Path,
        partitions: &[Partition],
        indices: &[usize],
    ) -> Vec<JobResult> {
        let wave_count = indices.len().div_ceil(self.jobs_at_once);
        let mut results = Vec::with_capacity(indices.len());

        for (wave, batch) in indices.chunks(self.jobs_at_once).enumerate() {
            log::info!(
                "Dispatching wave {}/{} ({} jobs)",
                wave + 1,
                wave_count,
                batch.len()
            );

            let bar = wave_bar(
                batch.len() as u64,
                format!("wave {}/{}", wave + 1, wave_count),
                self.show_progress,
            );

            let wave_results: Vec<JobResult> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|&index| {
                        let partition = &partitions[index];
                        log::debug!("make-part {}", partition.label());
                        let outcome = builder.build(data_file, partition);
                        bar.inc(1);
                        JobResult { index, outcome }
                    })
                    .collect()
            });

            let failed = wave_results.iter().filter(|r| !r.is_ok()).count();
            bar.finish_with_message(format!(
                "wave {}/{}: {} built, {} failed",
                wave + 1,
                wave_count,
                batch.len() - failed,
                failed
            ));

            results.extend(wave_results);
        }

        results
    }
}
