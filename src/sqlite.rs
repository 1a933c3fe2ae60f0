//! SQLite-backed durable job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use serde_json::Value;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobStatus, StatusCounts};
use crate::store::JobStore;

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

const SCHEMA: &str = r#"
-- Job records
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    params TEXT NOT NULL,
    result TEXT,
    error TEXT,
    attempts INTEGER NOT NULL DEFAULT 0
);

-- Claim/position scans over the queued set
CREATE INDEX IF NOT EXISTS idx_jobs_queue ON jobs(status, created_at, id);

-- Retention sweep and stale-processing reclaim
CREATE INDEX IF NOT EXISTS idx_jobs_updated ON jobs(status, updated_at);
"#;

const JOB_COLUMNS: &str =
    "id, job_type, status, created_at, updated_at, params, result, error, attempts";

/// Initialize the database schema.
pub fn init_schema(conn: &rusqlite::Connection) -> Result<(), tokio_rusqlite::Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// SQLite-based durable job store.
///
/// All mutations are committed before the call returns, so an acknowledged
/// write survives a crash. The claim is a conditional update inside one
/// immediate transaction, which gives at-most-one-claim even with multiple
/// processes sharing the database file.
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| QueueError::StoreUnavailable(e.to_string()))?;

        conn.call(|conn| init_schema(conn))
            .await
            .map_err(|e| QueueError::StoreUnavailable(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Open a file-backed database, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(path)
            .await
            .map_err(|e| QueueError::StoreUnavailable(e.to_string()))?;

        conn.call(|conn| init_schema(conn))
            .await
            .map_err(|e| QueueError::StoreUnavailable(e.to_string()))?;

        Ok(Self { conn })
    }
}

fn store_err(e: tokio_rusqlite::Error) -> QueueError {
    QueueError::StoreUnavailable(e.to_string())
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json(idx: usize, raw: String) -> rusqlite::Result<Value> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    let status: String = row.get(2)?;
    let status = JobStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown status: {status}").into(),
        )
    })?;

    let result: Option<String> = row.get(6)?;
    let result = result.map(|raw| parse_json(6, raw)).transpose()?;

    Ok(Job {
        id,
        job_type: row.get(1)?,
        status,
        created_at: parse_timestamp(3, row.get(3)?)?,
        updated_at: parse_timestamp(4, row.get(4)?)?,
        params: parse_json(5, row.get(5)?)?,
        result,
        error: row.get(7)?,
        attempts: row.get(8)?,
    })
}

/// Outcome of the conditional status update, carried out of the
/// database closure so the caller can map it to the right error.
enum UpdateOutcome {
    Updated(Job),
    Missing,
    Conflict(JobStatus),
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        let params_json = serde_json::to_string(&job.params)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let result_json = job
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let job = job.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (id, job_type, status, created_at, updated_at, params, result, error, attempts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        job.id.to_string(),
                        job.job_type,
                        job.status.as_str(),
                        job.created_at.to_rfc3339(),
                        job.updated_at.to_rfc3339(),
                        params_json,
                        result_json,
                        job.error,
                        job.attempts,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let job = conn
                    .query_row(
                        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                        [&id],
                        row_to_job,
                    )
                    .optional()?;
                Ok(job)
            })
            .await
            .map_err(store_err)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Job, QueueError> {
        let result_json = result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let id_text = id.to_string();
        let now = Utc::now().to_rfc3339();

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let current: Option<String> = tx
                    .query_row(
                        "SELECT status FROM jobs WHERE id = ?1",
                        [&id_text],
                        |row| row.get(0),
                    )
                    .optional()?;

                let Some(current) = current else {
                    tx.commit()?;
                    return Ok(UpdateOutcome::Missing);
                };
                let current = JobStatus::parse(&current).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        Type::Text,
                        format!("unknown status: {current}").into(),
                    )
                })?;

                if !current.can_transition_to(status) {
                    tx.commit()?;
                    return Ok(UpdateOutcome::Conflict(current));
                }

                tx.execute(
                    "UPDATE jobs SET status = ?1, updated_at = ?2, result = ?3, error = ?4
                     WHERE id = ?5",
                    params![status.as_str(), now, result_json, error, id_text],
                )?;

                let job = tx.query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                    [&id_text],
                    row_to_job,
                )?;

                tx.commit()?;
                Ok(UpdateOutcome::Updated(job))
            })
            .await
            .map_err(store_err)?;

        match outcome {
            UpdateOutcome::Updated(job) => Ok(job),
            UpdateOutcome::Missing => Err(QueueError::JobNotFound(id)),
            UpdateOutcome::Conflict(from) => Err(QueueError::Conflict {
                id,
                from,
                to: status,
            }),
        }
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let now = Utc::now().to_rfc3339();

        let claimed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let next: Option<String> = tx
                    .query_row(
                        "SELECT id FROM jobs WHERE status = 'queued'
                         ORDER BY created_at ASC, id ASC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;

                let Some(id) = next else {
                    tx.commit()?;
                    return Ok(None);
                };

                // Claim iff still queued. With the immediate transaction this
                // can only miss if another process raced us between our BEGIN
                // and theirs; treat that as an empty poll.
                let updated = tx.execute(
                    "UPDATE jobs SET status = 'processing', attempts = attempts + 1, updated_at = ?1
                     WHERE id = ?2 AND status = 'queued'",
                    params![now, id],
                )?;
                if updated == 0 {
                    tx.commit()?;
                    return Ok(None);
                }

                let job = tx.query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                    [&id],
                    row_to_job,
                )?;

                tx.commit()?;
                Ok(Some(job))
            })
            .await
            .map_err(store_err)?;

        if let Some(ref job) = claimed {
            debug!("claimed job {} (attempt {})", job.id, job.attempts);
        }
        Ok(claimed)
    }

    async fn position_of(&self, id: Uuid) -> Result<u64, QueueError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let target: Option<(String, String)> = conn
                    .query_row(
                        "SELECT status, created_at FROM jobs WHERE id = ?1",
                        [&id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let Some((status, created_at)) = target else {
                    return Ok(0);
                };
                if status != "queued" {
                    return Ok(0);
                }

                let rank: u64 = conn.query_row(
                    "SELECT COUNT(*) FROM jobs WHERE status = 'queued'
                     AND (created_at < ?1 OR (created_at = ?1 AND id <= ?2))",
                    params![created_at, id],
                    |row| row.get(0),
                )?;
                Ok(rank)
            })
            .await
            .map_err(store_err)
    }

    async fn counts(&self) -> Result<StatusCounts, QueueError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
                let mut counts = StatusCounts::default();

                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
                })?;
                for row in rows {
                    let (status, count) = row?;
                    match JobStatus::parse(&status) {
                        Some(JobStatus::Queued) => counts.queued = count,
                        Some(JobStatus::Processing) => counts.processing = count,
                        Some(JobStatus::Completed) => counts.completed = count,
                        Some(JobStatus::Failed) => counts.failed = count,
                        None => {}
                    }
                }
                Ok(counts)
            })
            .await
            .map_err(store_err)
    }

    async fn delete_older_than(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let mut args: Vec<String> = vec![cutoff.to_rfc3339()];
        args.extend(statuses.iter().map(|s| s.as_str().to_string()));
        let placeholders = (2..=args.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        self.conn
            .call(move |conn| {
                let deleted = conn.execute(
                    &format!("DELETE FROM jobs WHERE updated_at < ?1 AND status IN ({placeholders})"),
                    rusqlite::params_from_iter(args),
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(store_err)
    }

    async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, QueueError> {
        let now = Utc::now().to_rfc3339();
        let cutoff = cutoff.to_rfc3339();

        self.conn
            .call(move |conn| {
                let requeued = conn.execute(
                    "UPDATE jobs SET status = 'queued', updated_at = ?1
                     WHERE status = 'processing' AND updated_at < ?2",
                    params![now, cutoff],
                )?;
                Ok(requeued as u64)
            })
            .await
            .map_err(store_err)
    }
}
