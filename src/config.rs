//! Pipeline configuration
//!
//! Stored as JSON. Missing fields take their defaults, so a config file only
//! needs the settings it changes:
//!
//! ```json
//! { "total_jobs": 32, "overlap": 50000, "builder": { "program": "/opt/bin/make-part" } }
//! ```

use crate::build::RetryPolicy;
use crate::error::PipelineError;
use crate::table::MAX_INDEX_WIDTH;
use crate::utils::{get_config_path, resolve_threads};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a collaborator (partition builder or merger) runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collaborator {
    /// Spawn this executable's own worker subcommand
    #[default]
    #[serde(rename = "self")]
    CurrentExe,
    /// Run inside the coordinator process
    InProcess,
    /// Spawn an external program with the worker argument convention
    Program(PathBuf),
}

/// Settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of partitions to split the corpus into
    #[serde(default = "default_total_jobs")]
    pub total_jobs: usize,

    /// Partition builds running at once within a wave
    #[serde(default = "default_jobs_at_once")]
    pub jobs_at_once: usize,

    /// Bytes each partition extends past its nominal end
    #[serde(default = "default_overlap")]
    pub overlap: u64,

    /// Pause between retry waves
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Give up after this many retry waves (None retries forever)
    #[serde(default)]
    pub max_retry_waves: Option<u32>,

    /// Thread hint passed to the merger (0 means all hardware threads)
    #[serde(default)]
    pub merge_threads: usize,

    /// Required bytes per index in the merged table (None derives it from the size)
    #[serde(default)]
    pub index_width: Option<usize>,

    /// Parent of the per-run scratch directory (None uses the output's directory)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub builder: Collaborator,

    #[serde(default)]
    pub merger: Collaborator,
}

fn default_total_jobs() -> usize {
    16
}

fn default_jobs_at_once() -> usize {
    16
}

fn default_overlap() -> u64 {
    100_000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_jobs: default_total_jobs(),
            jobs_at_once: default_jobs_at_once(),
            overlap: default_overlap(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_waves: None,
            merge_threads: 0,
            index_width: None,
            scratch_dir: None,
            builder: Collaborator::default(),
            merger: Collaborator::default(),
        }
    }
}

impl PipelineConfig {
    /// Load config from `path`, or from the app data directory when `path` is None
    ///
    /// A missing default config file yields the defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => match get_config_path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        Ok(config)
    }

    /// Save config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.total_jobs == 0 {
            return Err(PipelineError::Config("total_jobs must be at least 1".into()));
        }
        if self.jobs_at_once == 0 {
            return Err(PipelineError::Config("jobs_at_once must be at least 1".into()));
        }
        if let Some(width) = self.index_width {
            if !(1..=MAX_INDEX_WIDTH).contains(&width) {
                return Err(PipelineError::Config(format!(
                    "index_width must be between 1 and {MAX_INDEX_WIDTH}, got {width}"
                )));
            }
        }
        Ok(())
    }

    /// Retry policy for the verify loop
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(self.retry_delay_ms),
            max_waves: self.max_retry_waves,
        }
    }

    /// Merge thread hint with 0 resolved to the hardware thread count
    pub fn effective_merge_threads(&self) -> usize {
        resolve_threads(self.merge_threads)
    }
}
