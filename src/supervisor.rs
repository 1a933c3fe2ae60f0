//! Per-attempt execution supervision: deadline enforcement, error
//! classification, and bounded-retry accounting.

use std::time::Duration;

use tracing::debug;

use crate::config::QueueConfig;
use crate::handler::JobHandler;
use crate::job::Job;

/// Verdict for a single supervised attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Handler returned a result; the job is done.
    Completed(serde_json::Value),
    /// Retryable failure with attempts remaining; requeue.
    Retry(String),
    /// Non-retryable failure, or attempts exhausted; terminal.
    Failed(String),
}

/// Wraps one handler invocation with a hard wall-clock deadline and maps
/// the outcome against the job's attempt budget.
///
/// `attempts` is incremented by the claim, so during attempt N the job
/// carries `attempts == N`; retries are allowed while `N <= max_retries`,
/// giving `max_retries + 1` executions in total.
pub struct Supervisor {
    deadline: Duration,
    max_retries: u32,
}

impl Supervisor {
    /// Build from queue configuration.
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            deadline: config.job_timeout(),
            max_retries: config.max_retries,
        }
    }

    /// Run one attempt of `job` through `handler`.
    pub async fn run_attempt(&self, job: &Job, handler: &dyn JobHandler) -> AttemptVerdict {
        let attempts_remain = job.attempts <= self.max_retries;

        match tokio::time::timeout(self.deadline, handler.handle(&job.params)).await {
            Ok(Ok(result)) => AttemptVerdict::Completed(result),
            Ok(Err(failure)) if failure.retryable && attempts_remain => {
                debug!(
                    "job {} attempt {} failed, will retry: {}",
                    job.id, job.attempts, failure.message
                );
                AttemptVerdict::Retry(failure.message)
            }
            Ok(Err(failure)) => AttemptVerdict::Failed(failure.message),
            Err(_) => {
                let message = format!(
                    "attempt timed out after {}s",
                    self.deadline.as_secs()
                );
                if attempts_remain {
                    debug!("job {} attempt {}: {}", job.id, job.attempts, message);
                    AttemptVerdict::Retry(message)
                } else {
                    AttemptVerdict::Failed(message)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerFailure;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct OkHandler;

    #[async_trait]
    impl JobHandler for OkHandler {
        async fn handle(&self, _params: &Value) -> Result<Value, HandlerFailure> {
            Ok(json!({"y": 2}))
        }
    }

    struct FlakyHandler;

    #[async_trait]
    impl JobHandler for FlakyHandler {
        async fn handle(&self, _params: &Value) -> Result<Value, HandlerFailure> {
            Err(HandlerFailure::retryable("upstream unavailable"))
        }
    }

    struct FatalHandler;

    #[async_trait]
    impl JobHandler for FatalHandler {
        async fn handle(&self, _params: &Value) -> Result<Value, HandlerFailure> {
            Err(HandlerFailure::fatal("bad input"))
        }
    }

    struct SleepyHandler;

    #[async_trait]
    impl JobHandler for SleepyHandler {
        async fn handle(&self, _params: &Value) -> Result<Value, HandlerFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    fn supervisor(max_retries: u32, timeout_secs: u64) -> Supervisor {
        Supervisor::new(&QueueConfig {
            max_retries,
            job_timeout_secs: timeout_secs,
            ..Default::default()
        })
    }

    fn job_on_attempt(attempts: u32) -> Job {
        let mut job = Job::new("demo", json!({}));
        job.attempts = attempts;
        job
    }

    #[tokio::test]
    async fn test_success() {
        let verdict = supervisor(3, 300)
            .run_attempt(&job_on_attempt(1), &OkHandler)
            .await;
        assert_eq!(verdict, AttemptVerdict::Completed(json!({"y": 2})));
    }

    #[tokio::test]
    async fn test_retryable_until_budget_exhausted() {
        let sup = supervisor(3, 300);

        for attempt in 1..=3 {
            let verdict = sup.run_attempt(&job_on_attempt(attempt), &FlakyHandler).await;
            assert_eq!(
                verdict,
                AttemptVerdict::Retry("upstream unavailable".into()),
                "attempt {attempt} should retry"
            );
        }

        // Fourth execution is the last: no budget left.
        let verdict = sup.run_attempt(&job_on_attempt(4), &FlakyHandler).await;
        assert_eq!(verdict, AttemptVerdict::Failed("upstream unavailable".into()));
    }

    #[tokio::test]
    async fn test_fatal_never_retries() {
        let verdict = supervisor(3, 300)
            .run_attempt(&job_on_attempt(1), &FatalHandler)
            .await;
        assert_eq!(verdict, AttemptVerdict::Failed("bad input".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retryable() {
        let verdict = supervisor(3, 5)
            .run_attempt(&job_on_attempt(1), &SleepyHandler)
            .await;
        assert_eq!(
            verdict,
            AttemptVerdict::Retry("attempt timed out after 5s".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_when_exhausted() {
        let verdict = supervisor(3, 5)
            .run_attempt(&job_on_attempt(4), &SleepyHandler)
            .await;
        assert_eq!(
            verdict,
            AttemptVerdict::Failed("attempt timed out after 5s".into())
        );
    }
}
