//! Worker pool for job execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::handler::HandlerRegistry;
use crate::job::{Job, JobStatus};
use crate::queue::QueueIndex;
use crate::store::JobStore;
use crate::supervisor::{AttemptVerdict, Supervisor};

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

/// A single worker: claims jobs, runs them under the supervisor, and
/// writes the outcome back to the store.
pub struct Worker {
    id: u32,
    store: Arc<dyn JobStore>,
    index: Arc<QueueIndex>,
    registry: Arc<HandlerRegistry>,
    supervisor: Supervisor,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Worker {
    /// Create a new worker.
    pub fn new(
        id: u32,
        config: &QueueConfig,
        store: Arc<dyn JobStore>,
        index: Arc<QueueIndex>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            id,
            store,
            index,
            registry,
            supervisor: Supervisor::new(config),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Worker ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Jobs this worker completed.
    pub fn jobs_completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Jobs this worker drove to terminal failure.
    pub fn jobs_failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Execute one claimed job and persist its outcome.
    pub async fn process(&self, job: Job) -> Result<(), QueueError> {
        debug!("worker {} processing job {} ({})", self.id, job.id, job.job_type);

        // Submission already validated the type; re-check in case the
        // registry changed between submit and claim.
        let Some(handler) = self.registry.get(&job.job_type) else {
            let err = QueueError::UnknownJobType(job.job_type.clone());
            warn!("worker {}: {}", self.id, err);
            self.store
                .update_status(job.id, JobStatus::Failed, None, Some(err.to_string()))
                .await?;
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        };

        match self.supervisor.run_attempt(&job, handler.as_ref()).await {
            AttemptVerdict::Completed(result) => {
                self.store
                    .update_status(job.id, JobStatus::Completed, Some(result), None)
                    .await?;
                self.completed.fetch_add(1, Ordering::SeqCst);
                debug!("worker {} completed job {}", self.id, job.id);
            }
            AttemptVerdict::Retry(message) => {
                // Back to the queue; created_at is untouched, so the job
                // keeps its original ordering.
                self.store
                    .update_status(job.id, JobStatus::Queued, None, None)
                    .await?;
                debug!(
                    "worker {} requeued job {} after attempt {}: {}",
                    self.id, job.id, job.attempts, message
                );
            }
            AttemptVerdict::Failed(message) => {
                self.store
                    .update_status(job.id, JobStatus::Failed, None, Some(message.clone()))
                    .await?;
                self.failed.fetch_add(1, Ordering::SeqCst);
                error!(
                    "worker {} failed job {} after {} attempt(s): {}",
                    self.id, job.id, job.attempts, message
                );
            }
        }

        Ok(())
    }

    /// Claim-execute loop. Runs until a shutdown signal arrives; an
    /// in-flight job always finishes before the loop exits.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        debug!("worker {} started", self.id);

        loop {
            match self.index.claim_next().await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process(job).await {
                        error!("worker {}: failed to record job outcome: {}", self.id, e);
                    }
                    match shutdown.try_recv() {
                        Err(broadcast::error::TryRecvError::Empty) => {}
                        _ => break,
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = self.index.wait_for_work() => {}
                    }
                }
                Err(e) => {
                    warn!("worker {}: claim failed: {}", self.id, e);
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = self.index.wait_for_work() => {}
                    }
                }
            }
        }

        debug!("worker {} stopped", self.id);
    }
}

/// Fixed-size pool of symmetric workers sharing one queue index.
///
/// No job-type affinity: every worker pulls from the same index, so load
/// across job types self-balances.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
}

impl WorkerPool {
    /// Create a pool of `config.max_workers` workers.
    pub fn new(
        config: &QueueConfig,
        store: Arc<dyn JobStore>,
        index: Arc<QueueIndex>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let workers = (0..config.max_workers)
            .map(|id| {
                Arc::new(Worker::new(
                    id,
                    config,
                    store.clone(),
                    index.clone(),
                    registry.clone(),
                ))
            })
            .collect();
        Self { workers }
    }

    /// Pool size.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Total jobs completed across all workers.
    pub fn total_completed(&self) -> u64 {
        self.workers.iter().map(|w| w.jobs_completed()).sum()
    }

    /// Total jobs driven to terminal failure across all workers.
    pub fn total_failed(&self) -> u64 {
        self.workers.iter().map(|w| w.jobs_failed()).sum()
    }

    /// Spawn one run loop per worker, each with its own shutdown receiver.
    pub fn spawn(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        info!("worker pool started with {} workers", self.workers.len());
        self.workers
            .iter()
            .map(|worker| {
                let worker = worker.clone();
                let rx = shutdown.subscribe();
                tokio::spawn(async move { worker.run(rx).await })
            })
            .collect()
    }
}
