//! Periodic housekeeping: retention sweep and stale-job reclaim.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::job::JobStatus;
use crate::store::JobStore;

/// Single periodic task that purges terminal jobs past the retention
/// window and, when enabled, requeues `Processing` jobs abandoned by a
/// dead worker process.
///
/// Runs are sequential by construction (one loop, each sweep awaited), so
/// a sweep never overlaps itself. A failing store skips the run with a
/// warning; it never takes the process down.
pub struct Housekeeper {
    store: Arc<dyn JobStore>,
    interval: Duration,
    retention: chrono::Duration,
    reclaim_stale: bool,
    stale_after: chrono::Duration,
}

impl Housekeeper {
    /// Build from queue configuration.
    pub fn new(config: &QueueConfig, store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            interval: config.housekeeping_interval(),
            retention: chrono::Duration::days(config.retention_days),
            reclaim_stale: config.reclaim_stale_processing,
            // A job updated less than two deadlines ago may still be
            // running; anything older has no live owner.
            stale_after: chrono::Duration::seconds(2 * config.job_timeout_secs as i64),
        }
    }

    /// Run one sweep. Errors are logged and swallowed.
    pub async fn sweep(&self) {
        let cutoff = Utc::now() - self.retention;
        match self
            .store
            .delete_older_than(&[JobStatus::Completed, JobStatus::Failed], cutoff)
            .await
        {
            Ok(0) => debug!("retention sweep: nothing to purge"),
            Ok(n) => info!("retention sweep: purged {} terminal jobs older than {}", n, cutoff),
            Err(e) => warn!("retention sweep skipped: {}", e),
        }

        if self.reclaim_stale {
            let cutoff = Utc::now() - self.stale_after;
            match self.store.requeue_stale(cutoff).await {
                Ok(0) => {}
                Ok(n) => info!("reclaimed {} stale processing jobs", n),
                Err(e) => warn!("stale-job reclaim skipped: {}", e),
            }
        }
    }

    /// Periodic loop. Sweeps once per interval until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; skip that tick so the first sweep
        // happens one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }

        debug!("housekeeper stopped");
    }
}
