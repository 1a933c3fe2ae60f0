//! # jobmill
//!
//! Durable background job queue and worker dispatch.
//!
//! ## Features
//!
//! - SQLite-backed job store (all lifecycle state persisted before acknowledgment)
//! - Atomic claim: concurrent workers never take the same job
//! - Fixed-size worker pool with pluggable per-type handlers
//! - Bounded retry with a hard per-attempt deadline
//! - Queue position and status reporting for polling producers
//! - Periodic retention sweep of finished jobs

pub mod config;
pub mod error;
pub mod handler;
pub mod housekeeping;
pub mod job;
pub mod queue;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use config::QueueConfig;
pub use error::QueueError;
pub use handler::{HandlerFailure, HandlerRegistry, JobHandler};
pub use housekeeping::Housekeeper;
pub use job::{Job, JobReport, JobStatus, StatusCounts};
pub use queue::QueueIndex;
pub use service::JobQueue;
pub use sqlite::SqliteJobStore;
pub use store::{JobStore, MemoryJobStore};
pub use supervisor::{AttemptVerdict, Supervisor};
pub use worker::{Worker, WorkerPool};
