//! Partition verification and retry
//!
//! A partition passes when its last build attempt returned `Ok`, its slice
//! file exists and its table file exists with a non-zero size. The size check
//! is a weak proxy: a truncated but non-empty table still passes.
//!
//! Failed partitions are rebuilt over the same byte range in the next retry
//! wave after a fixed delay. With the default policy this repeats forever; a
//! builder that never succeeds hangs the pipeline.

use super::runner::{JobResult, JobRunner};
use super::PartitionBuilder;
use crate::error::PipelineError;
use crate::partition::Partition;
use crate::pipeline::{enter, Stage};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Delay and cap for the verify/retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause before each retry wave
    pub delay: Duration,
    /// Maximum number of retry waves (None retries forever)
    pub max_waves: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_waves: None,
        }
    }
}

impl RetryPolicy {
    /// Retry forever with the given delay
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_waves: None,
        }
    }

    /// Give up after `max_waves` retry waves
    pub fn bounded(delay: Duration, max_waves: u32) -> Self {
        Self {
            delay,
            max_waves: Some(max_waves),
        }
    }

    fn exhausted(&self, waves_done: u32) -> bool {
        self.max_waves.is_some_and(|max| waves_done >= max)
    }
}

/// File-state check for a single partition
pub fn partition_is_valid(partition: &Partition) -> bool {
    partition.source_range_file.exists()
        && fs::metadata(&partition.table_file)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
}

/// Tracks which partitions have passed verification
///
/// Passing is sticky: a verified partition is never checked again in the same
/// run, so the failure set can only shrink.
#[derive(Debug)]
pub struct Verifier {
    verified: Vec<bool>,
    /// Builder error from the latest attempt, if any
    last_error: Vec<Option<String>>,
}

impl Verifier {
    pub fn new(partition_count: usize) -> Self {
        Self {
            verified: vec![false; partition_count],
            last_error: vec![None; partition_count],
        }
    }

    /// Record the builder's own report for one attempt
    pub fn record(&mut self, result: &JobResult) {
        self.last_error[result.index] = result.outcome.as_ref().err().map(|e| e.to_string());
    }

    /// Check every unverified partition, returning the indices that failed
    pub fn verify(&mut self, partitions: &[Partition]) -> Vec<usize> {
        let mut failed = Vec::new();

        for (index, partition) in partitions.iter().enumerate() {
            if self.verified[index] {
                continue;
            }

            if let Some(reason) = &self.last_error[index] {
                log::warn!("partition {} failed: {}", partition.label(), reason);
                failed.push(index);
            } else if !partition_is_valid(partition) {
                log::warn!(
                    "partition {} produced no usable table at {}",
                    partition.label(),
                    partition.table_file.display()
                );
                failed.push(index);
            } else {
                self.verified[index] = true;
            }
        }

        failed
    }

    pub fn is_verified(&self, index: usize) -> bool {
        self.verified[index]
    }

    pub fn verified_count(&self) -> usize {
        self.verified.iter().filter(|&&v| v).count()
    }
}

/// Summary of the build phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Retry waves issued after the initial build
    pub retry_waves: u32,
    /// Build attempts per partition
    pub attempts: Vec<u32>,
    /// Building and verifying stages in the order they were entered
    pub stages: Vec<Stage>,
}

/// Build every partition, then verify and rebuild failures until all pass
pub fn build_all(
    runner: &JobRunner,
    builder: &dyn PartitionBuilder,
    data_file: &Path,
    partitions: &[Partition],
    policy: &RetryPolicy,
) -> Result<BuildReport, PipelineError> {
    let mut verifier = Verifier::new(partitions.len());
    let mut attempts = vec![0u32; partitions.len()];
    let mut pending: Vec<usize> = (0..partitions.len()).collect();
    let mut retry_waves = 0u32;
    let mut stages = Vec::new();

    log::info!(
        "Building {} partitions, {} at once",
        partitions.len(),
        runner.jobs_at_once()
    );

    loop {
        enter(&mut stages, Stage::Building);
        for result in runner.run(builder, data_file, partitions, &pending) {
            attempts[result.index] += 1;
            verifier.record(&result);
        }

        enter(&mut stages, Stage::Verifying);
        log::info!("Verifying partitions...");
        let failed = verifier.verify(partitions);
        if failed.is_empty() {
            break;
        }

        if policy.exhausted(retry_waves) {
            return Err(PipelineError::RetriesExhausted {
                failed: failed.len(),
                waves: retry_waves,
            });
        }

        log::warn!("Rerunning {} failed jobs...", failed.len());
        thread::sleep(policy.delay);
        retry_waves += 1;
        pending = failed;
    }

    log::info!(
        "All {} partitions verified after {} retry wave(s)",
        verifier.verified_count(),
        retry_waves
    );

    Ok(BuildReport {
        retry_waves,
        attempts,
        stages,
    })
}
