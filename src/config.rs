//! Queue configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Maximum retries per job after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Hard wall-clock deadline for a single execution attempt, in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Worker idle backoff when the queue is empty, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Interval between housekeeping sweeps, in seconds.
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_secs: u64,

    /// Minimum age of terminal jobs before the sweep deletes them, in days.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Requeue `Processing` jobs whose last update is older than twice the
    /// attempt deadline. Recovers jobs orphaned by a crashed worker process;
    /// off by default.
    #[serde(default)]
    pub reclaim_stale_processing: bool,

    /// Database path for job persistence (None = in-memory).
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_max_workers() -> u32 {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_job_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    1
}

fn default_housekeeping_interval() -> u64 {
    24 * 60 * 60
}

fn default_retention_days() -> i64 {
    7
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            job_timeout_secs: default_job_timeout(),
            poll_interval_secs: default_poll_interval(),
            housekeeping_interval_secs: default_housekeeping_interval(),
            retention_days: default_retention_days(),
            reclaim_stale_processing: false,
            db_path: None,
        }
    }
}

impl QueueConfig {
    /// Attempt deadline as a `Duration`.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Idle backoff as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Housekeeping interval as a `Duration`.
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }
}
