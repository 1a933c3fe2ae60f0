//! The job queue service object.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::handler::HandlerRegistry;
use crate::housekeeping::Housekeeper;
use crate::job::{Job, JobReport, JobStatus, StatusCounts};
use crate::queue::QueueIndex;
use crate::sqlite::SqliteJobStore;
use crate::store::JobStore;
use crate::worker::WorkerPool;

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

/// Durable job queue: owns the store, handler registry, worker pool, and
/// housekeeper. Constructed once at process startup and torn down with
/// [`JobQueue::shutdown`]; no ambient global state.
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    index: Arc<QueueIndex>,
    pool: WorkerPool,
    housekeeper: Arc<Housekeeper>,
    shutdown: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Create a queue backed by SQLite at `config.db_path`
    /// (in-memory when unset).
    pub async fn new(config: QueueConfig, registry: HandlerRegistry) -> Result<Self, QueueError> {
        let store: Arc<dyn JobStore> = match &config.db_path {
            Some(path) => Arc::new(SqliteJobStore::open(path).await?),
            None => Arc::new(SqliteJobStore::in_memory().await?),
        };
        Ok(Self::with_store(config, registry, store))
    }

    /// Create a queue over an existing store.
    pub fn with_store(
        config: QueueConfig,
        registry: HandlerRegistry,
        store: Arc<dyn JobStore>,
    ) -> Self {
        let registry = Arc::new(registry);
        let index = Arc::new(QueueIndex::new(store.clone(), config.poll_interval()));
        let pool = WorkerPool::new(&config, store.clone(), index.clone(), registry.clone());
        let housekeeper = Arc::new(Housekeeper::new(&config, store.clone()));
        let (shutdown, _) = broadcast::channel(1);

        Self {
            store,
            registry,
            index,
            pool,
            housekeeper,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the worker pool and the housekeeper.
    pub fn start(&self) {
        let mut handles = self.handles.lock().expect("handle registry poisoned");
        if !handles.is_empty() {
            return;
        }

        handles.extend(self.pool.spawn(&self.shutdown));

        let housekeeper = self.housekeeper.clone();
        let rx = self.shutdown.subscribe();
        handles.push(tokio::spawn(async move { housekeeper.run(rx).await }));

        info!("job queue started ({} workers)", self.pool.size());
    }

    /// Submit a new job. Validates the type against the handler registry
    /// so unknown types fail here rather than at execution. Returns once
    /// the job is durably queued; execution is asynchronous.
    pub async fn submit(
        &self,
        job_type: impl Into<String>,
        params: Value,
    ) -> Result<Uuid, QueueError> {
        let job_type = job_type.into();
        if !self.registry.contains(&job_type) {
            return Err(QueueError::InvalidJobType(job_type));
        }

        let job = Job::new(job_type, params);
        self.store.insert(&job).await?;
        self.index.notify();

        debug!("submitted job {} ({})", job.id, job.job_type);
        Ok(job.id)
    }

    /// Status report for a job: queue position while queued, result on
    /// completion, error on failure. Producers poll this until terminal.
    pub async fn status(&self, id: Uuid) -> Result<JobReport, QueueError> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(QueueError::JobNotFound(id))?;

        let position = if job.status == JobStatus::Queued {
            Some(self.index.position_of(id).await?)
        } else {
            None
        };

        Ok(JobReport::new(&job, position))
    }

    /// Snapshot of job counts per status.
    pub async fn counts(&self) -> Result<StatusCounts, QueueError> {
        self.store.counts().await
    }

    /// Direct store access, for collaborators layered on top.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Signal shutdown and wait for workers and the housekeeper to stop.
    /// Workers finish their in-flight job first; jobs still `Queued`
    /// remain in the store and are picked up on the next start.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(());

        let drained: Vec<JoinHandle<()>> = {
            let mut handles = self.handles.lock().expect("handle registry poisoned");
            handles.drain(..).collect()
        };
        for handle in drained {
            let _ = handle.await;
        }

        info!("job queue stopped");
    }
}
