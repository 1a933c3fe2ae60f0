use super::*;
use serde_json::json;

fn queued_job(job_type: &str) -> Job {
    Job::new(job_type, json!({"x": 1}))
}

#[tokio::test]
async fn test_insert_and_get() {
    let store = MemoryJobStore::new();
    let job = queued_job("explanation");

    store.insert(&job).await.unwrap();

    let loaded = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.job_type, "explanation");
    assert_eq!(loaded.status, JobStatus::Queued);
    assert_eq!(loaded.params, json!({"x": 1}));
}

#[tokio::test]
async fn test_get_missing() {
    let store = MemoryJobStore::new();
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_follows_creation_order() {
    let store = MemoryJobStore::new();
    let mut first = queued_job("demo");
    let mut second = queued_job("demo");
    first.created_at = Utc::now() - chrono::Duration::seconds(10);
    second.created_at = Utc::now() - chrono::Duration::seconds(5);

    // Insert newest first; claim must still pick the oldest.
    store.insert(&second).await.unwrap();
    store.insert(&first).await.unwrap();

    let claimed = store.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.attempts, 1);

    let claimed = store.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);

    assert!(store.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_increments_attempts_across_retries() {
    let store = MemoryJobStore::new();
    let job = queued_job("demo");
    store.insert(&job).await.unwrap();

    for expected in 1..=3u32 {
        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.attempts, expected);
        store
            .update_status(job.id, JobStatus::Queued, None, None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_update_status_conflict_on_terminal() {
    let store = MemoryJobStore::new();
    let job = queued_job("demo");
    store.insert(&job).await.unwrap();

    store.claim_next().await.unwrap().unwrap();
    store
        .update_status(job.id, JobStatus::Completed, Some(json!({"y": 2})), None)
        .await
        .unwrap();

    // Double-completion must be rejected.
    let err = store
        .update_status(job.id, JobStatus::Completed, Some(json!({"y": 3})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Conflict { .. }));

    // Terminal jobs cannot re-enter the queue either.
    let err = store
        .update_status(job.id, JobStatus::Queued, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Conflict { .. }));

    let loaded = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.result, Some(json!({"y": 2})));
}

#[tokio::test]
async fn test_update_status_unknown_job() {
    let store = MemoryJobStore::new();
    let err = store
        .update_status(Uuid::new_v4(), JobStatus::Processing, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::JobNotFound(_)));
}

#[tokio::test]
async fn test_position_reflects_queue_order() {
    let store = MemoryJobStore::new();
    let mut jobs = Vec::new();
    for i in 0..5 {
        let mut job = queued_job("demo");
        job.created_at = Utc::now() - chrono::Duration::seconds(100 - i);
        store.insert(&job).await.unwrap();
        jobs.push(job);
    }

    assert_eq!(store.position_of(jobs[2].id).await.unwrap(), 3);

    // Claim the two oldest; the third moves to the front.
    store.claim_next().await.unwrap().unwrap();
    store.claim_next().await.unwrap().unwrap();
    assert_eq!(store.position_of(jobs[2].id).await.unwrap(), 1);

    // Claimed and absent jobs report no position.
    assert_eq!(store.position_of(jobs[0].id).await.unwrap(), 0);
    assert_eq!(store.position_of(Uuid::new_v4()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_counts_snapshot() {
    let store = MemoryJobStore::new();
    for _ in 0..3 {
        store.insert(&queued_job("demo")).await.unwrap();
    }
    let claimed = store.claim_next().await.unwrap().unwrap();
    store
        .update_status(claimed.id, JobStatus::Failed, None, Some("boom".into()))
        .await
        .unwrap();
    store.claim_next().await.unwrap().unwrap();

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.queued, 1);
    assert_eq!(counts.processing, 1);
    assert_eq!(counts.completed, 0);
    assert_eq!(counts.failed, 1);
}

#[tokio::test]
async fn test_delete_older_than_is_selective_and_idempotent() {
    let store = MemoryJobStore::new();
    let cutoff = Utc::now() - chrono::Duration::days(7);

    let mut old_done = queued_job("demo");
    old_done.status = JobStatus::Completed;
    old_done.updated_at = cutoff - chrono::Duration::days(1);

    let mut old_failed = queued_job("demo");
    old_failed.status = JobStatus::Failed;
    old_failed.updated_at = cutoff - chrono::Duration::hours(1);

    let mut fresh_done = queued_job("demo");
    fresh_done.status = JobStatus::Completed;
    fresh_done.updated_at = cutoff + chrono::Duration::days(1);

    // Old but still queued: retention never touches non-terminal jobs.
    let mut old_queued = queued_job("demo");
    old_queued.updated_at = cutoff - chrono::Duration::days(1);

    for job in [&old_done, &old_failed, &fresh_done, &old_queued] {
        store.insert(job).await.unwrap();
    }

    let terminal = [JobStatus::Completed, JobStatus::Failed];
    let deleted = store.delete_older_than(&terminal, cutoff).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(store.get(old_done.id).await.unwrap().is_none());
    assert!(store.get(old_failed.id).await.unwrap().is_none());
    assert!(store.get(fresh_done.id).await.unwrap().is_some());
    assert!(store.get(old_queued.id).await.unwrap().is_some());

    let deleted = store.delete_older_than(&terminal, cutoff).await.unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn test_requeue_stale_processing() {
    let store = MemoryJobStore::new();
    let cutoff = Utc::now() - chrono::Duration::minutes(10);

    let mut stale = queued_job("demo");
    stale.status = JobStatus::Processing;
    stale.updated_at = cutoff - chrono::Duration::minutes(5);

    let mut live = queued_job("demo");
    live.status = JobStatus::Processing;
    live.updated_at = Utc::now();

    store.insert(&stale).await.unwrap();
    store.insert(&live).await.unwrap();

    let requeued = store.requeue_stale(cutoff).await.unwrap();
    assert_eq!(requeued, 1);
    assert_eq!(
        store.get(stale.id).await.unwrap().unwrap().status,
        JobStatus::Queued
    );
    assert_eq!(
        store.get(live.id).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
}
