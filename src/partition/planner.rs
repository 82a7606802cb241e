//! Partition planning
//!
//! Splits a corpus of `data_size` bytes into at most `total_jobs` ranges of
//! `S = data_size / total_jobs` bytes, each extended by `overlap` bytes so that
//! suffixes straddling a boundary are still seen whole by one partition.

use super::types::Partition;
use crate::error::PipelineError;
use std::fs;
use std::path::Path;

/// Parameters for splitting a corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub data_size: u64,
    pub total_jobs: usize,
    pub overlap: u64,
}

impl PartitionPlan {
    pub fn new(data_size: u64, total_jobs: usize, overlap: u64) -> Self {
        Self {
            data_size,
            total_jobs,
            overlap,
        }
    }

    /// Nominal partition length (integer division, remainder goes to the last one)
    pub fn chunk_size(&self) -> u64 {
        if self.total_jobs == 0 {
            return 0;
        }
        self.data_size / self.total_jobs as u64
    }

    /// Byte ranges in ascending start order
    ///
    /// Range `i` is `[i*S, min((i+1)*S + overlap, data_size))`. Planning stops
    /// at the first range that reaches `data_size`, so fewer than `total_jobs`
    /// ranges may come back. The range with index `total_jobs - 1` always ends
    /// at `data_size`; a corpus shorter than `total_jobs` bytes is one range.
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        if self.data_size == 0 || self.total_jobs == 0 {
            return Vec::new();
        }

        let chunk = self.chunk_size();
        if chunk == 0 {
            return vec![(0, self.data_size)];
        }

        let last = self.total_jobs as u64 - 1;
        let mut ranges = Vec::with_capacity(self.total_jobs);

        for i in 0..self.total_jobs as u64 {
            let start = i * chunk;
            let end = if i == last {
                self.data_size
            } else {
                ((i + 1) * chunk)
                    .saturating_add(self.overlap)
                    .min(self.data_size)
            };

            ranges.push((start, end));

            if end == self.data_size {
                break;
            }
        }

        ranges
    }

    /// Partitions of `data_file` in ascending start order
    pub fn partitions(&self, data_file: &Path) -> Vec<Partition> {
        self.ranges()
            .into_iter()
            .map(|(start, end)| Partition::new(data_file, start, end))
            .collect()
    }
}

/// Read the corpus size and plan its partitions
pub fn plan_partitions(
    data_file: &Path,
    total_jobs: usize,
    overlap: u64,
) -> Result<(u64, Vec<Partition>), PipelineError> {
    if total_jobs == 0 {
        return Err(PipelineError::Config("total_jobs must be at least 1".into()));
    }

    let data_size = fs::metadata(data_file)
        .map_err(PipelineError::io(data_file, "stat corpus"))?
        .len();

    if data_size == 0 {
        return Err(PipelineError::EmptyCorpus(data_file.to_path_buf()));
    }

    let plan = PartitionPlan::new(data_size, total_jobs, overlap);
    Ok((data_size, plan.partitions(data_file)))
}
