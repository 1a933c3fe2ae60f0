//! Job record and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in queue, never claimed by a worker.
    Queued,
    /// Claimed; exactly one worker owns it.
    Processing,
    /// Finished with a result. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
}

impl JobStatus {
    /// Stable text form used in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the stable text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Check if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check if `next` is a legal successor of this status.
    ///
    /// Legal paths: `Queued -> Processing` (claim), `Processing -> Completed`
    /// and `Processing -> Failed` (terminal), `Processing -> Queued`
    /// (supervised retry), and `Queued -> Failed` (job whose handler was
    /// unregistered before it was ever claimed). Terminal states have no
    /// successors.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Queued)
        )
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Queued
    }
}

/// A persisted unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID, assigned at submission.
    pub id: Uuid,
    /// Handler selector (e.g. "explanation", "comparison"). Opaque to the core.
    pub job_type: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Submission time. Immutable; fixes queue ordering.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
    /// Opaque payload passed to the handler verbatim.
    pub params: Value,
    /// Result payload, set only on `Completed`.
    pub result: Option<Value>,
    /// Failure description, set only on `Failed`.
    pub error: Option<String>,
    /// Execution attempts started so far.
    pub attempts: u32,
}

impl Job {
    /// Create a new queued job.
    pub fn new(job_type: impl Into<String>, params: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            params,
            result: None,
            error: None,
            attempts: 0,
        }
    }
}

/// Point-in-time snapshot of job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Producer-facing status view, shaped for the polling contract:
/// `position` only while queued, `result` only on completion,
/// `error` only on failure.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobReport {
    /// Build a report from a job snapshot and an optional queue position.
    ///
    /// A `position` of 0 means "no longer queued" and is dropped, so a
    /// report never shows a position for a job that is not actually queued.
    pub fn new(job: &Job, position: Option<u64>) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            attempts: job.attempts,
            position: position.filter(|p| *p > 0 && job.status == JobStatus::Queued),
            result: if job.status == JobStatus::Completed {
                job.result.clone()
            } else {
                None
            },
            error: if job.status == JobStatus::Failed {
                job.error.clone()
            } else {
                None
            },
        }
    }
}
