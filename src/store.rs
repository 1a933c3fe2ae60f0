//! Job persistence store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobStatus, StatusCounts};

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Job store trait. The single source of truth: all cross-worker
/// coordination happens through atomic operations on it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. The write is durable before this returns.
    async fn insert(&self, job: &Job) -> Result<(), QueueError>;

    /// Load a job by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError>;

    /// Atomic read-modify-write of a job's status.
    ///
    /// Fails with `Conflict` when the current status is not a legal
    /// predecessor of `status` (double-completion guard). Always bumps
    /// `updated_at`. Returns the updated job.
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Job, QueueError>;

    /// Atomically claim the oldest queued job (ties broken by ID):
    /// transition it to `Processing`, increment `attempts`, and return it.
    /// Two concurrent callers never claim the same job.
    async fn claim_next(&self) -> Result<Option<Job>, QueueError>;

    /// 1-based rank of a job among currently queued jobs ordered by
    /// `(created_at, id)`. Returns 0 when the job is not queued.
    async fn position_of(&self, id: Uuid) -> Result<u64, QueueError>;

    /// Snapshot of job counts per status.
    async fn counts(&self) -> Result<StatusCounts, QueueError>;

    /// Bulk-delete jobs in the given statuses whose `updated_at` is older
    /// than `cutoff`. Returns the number deleted.
    async fn delete_older_than(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, QueueError>;

    /// Requeue `Processing` jobs whose `updated_at` is older than `cutoff`.
    /// Recovery pass for jobs orphaned by a dead worker process.
    /// Returns the number requeued.
    async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, QueueError>;
}

/// In-memory job store for tests and ephemeral use.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: tokio::sync::RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Job, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;

        if !job.status.can_transition_to(status) {
            return Err(QueueError::Conflict {
                id,
                from: job.status,
                to: status,
            });
        }

        job.status = status;
        job.updated_at = Utc::now();
        job.result = result;
        job.error = error;
        Ok(job.clone())
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs.write().await;

        let next = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .map(|j| (j.created_at, j.id))
            .min();

        let Some((_, id)) = next else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn position_of(&self, id: Uuid) -> Result<u64, QueueError> {
        let jobs = self.jobs.read().await;

        let Some(job) = jobs.get(&id) else {
            return Ok(0);
        };
        if job.status != JobStatus::Queued {
            return Ok(0);
        }

        let rank = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .filter(|j| (j.created_at, j.id) <= (job.created_at, job.id))
            .count();
        Ok(rank as u64)
    }

    async fn counts(&self) -> Result<StatusCounts, QueueError> {
        let jobs = self.jobs.read().await;
        let mut counts = StatusCounts::default();

        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn delete_older_than(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| !(statuses.contains(&j.status) && j.updated_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }

    async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, QueueError> {
        let mut jobs = self.jobs.write().await;
        let now = Utc::now();
        let mut requeued = 0;

        for job in jobs.values_mut() {
            if job.status == JobStatus::Processing && job.updated_at < cutoff {
                job.status = JobStatus::Queued;
                job.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}
