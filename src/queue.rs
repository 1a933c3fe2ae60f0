//! Store-backed queue index: hands work to idle workers and answers
//! queue-position queries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::Job;
use crate::store::JobStore;

/// Derived ordering over the store's queued jobs.
///
/// Claims go straight to the store's atomic claim; the index only adds the
/// waiting strategy: a submit wakeup so idle workers react immediately,
/// with a poll-interval fallback so work inserted out of band (another
/// process, a stale-job reclaim) is still picked up.
pub struct QueueIndex {
    store: Arc<dyn JobStore>,
    wakeup: Notify,
    poll_interval: Duration,
}

impl QueueIndex {
    /// Create an index over a store.
    pub fn new(store: Arc<dyn JobStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            wakeup: Notify::new(),
            poll_interval,
        }
    }

    /// Wake one idle worker. Called after every submit; a permit is stored
    /// if no worker is currently waiting, so the wakeup is never lost.
    pub fn notify(&self) {
        self.wakeup.notify_one();
    }

    /// Atomically claim the oldest queued job, if any.
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        self.store.claim_next().await
    }

    /// Wait until a submit wakeup arrives or the poll interval elapses.
    pub async fn wait_for_work(&self) {
        let _ = tokio::time::timeout(self.poll_interval, self.wakeup.notified()).await;
    }

    /// 1-based queue position of a job; 0 when it is not queued.
    pub async fn position_of(&self, id: Uuid) -> Result<u64, QueueError> {
        self.store.position_of(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::store::MemoryJobStore;
    use serde_json::json;

    fn index() -> QueueIndex {
        QueueIndex::new(Arc::new(MemoryJobStore::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_claim_passthrough() {
        let idx = index();
        assert!(idx.claim_next().await.unwrap().is_none());

        let job = Job::new("demo", json!({}));
        idx.store.insert(&job).await.unwrap();

        let claimed = idx.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.status, JobStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_wakes_waiter_before_poll_interval() {
        let idx = Arc::new(index());

        let waiter = {
            let idx = idx.clone();
            tokio::spawn(async move { idx.wait_for_work().await })
        };
        tokio::task::yield_now().await;

        idx.notify();
        // Completes without advancing the 60s poll timer.
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_falls_back_to_poll_interval() {
        let idx = index();
        // No wakeup; the paused clock auto-advances through the timeout.
        idx.wait_for_work().await;
    }
}
