//! Job handlers and the type-tag registry.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Failure reported by a handler.
///
/// `retryable` failures re-enter the queue until attempts run out;
/// non-retryable ones (e.g. malformed input) go terminal immediately.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Human-readable failure description.
    pub message: String,
    /// Whether another attempt may succeed.
    pub retryable: bool,
}

impl HandlerFailure {
    /// A failure worth retrying.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that no retry can fix.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerFailure {}

/// Handler for one job type. This is where business logic plugs in;
/// the core never interprets the payload or the result.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one attempt with the job's payload.
    async fn handle(&self, params: &Value) -> Result<Value, HandlerFailure>;
}

/// Registry mapping job type tags to handlers.
///
/// Populated once at startup; submission validates against it so unknown
/// types fail fast instead of at execution time.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Check whether a job type has a handler.
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types.
    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}
