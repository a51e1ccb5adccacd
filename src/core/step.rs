//! Step contract and step results

use crate::core::{ErrorKind, ProcessingContext, StepError, StepStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of running one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    pub message: String,

    /// Wall-clock time across all attempts, in seconds
    #[serde(default)]
    pub duration_secs: f64,

    /// Number of `execute` attempts made
    #[serde(default)]
    pub attempts: u32,

    /// Classification of the failure, if any
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl StepResult {
    pub fn new(step_name: impl Into<String>, status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status,
            message: message.into(),
            duration_secs: 0.0,
            attempts: 0,
            error_kind: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn success(step_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(step_name, StepStatus::Success, message)
    }

    pub fn skipped(step_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(step_name, StepStatus::Skipped, message)
    }

    /// Failed result carrying the error's classification
    pub fn failed(step_name: impl Into<String>, error: &StepError) -> Self {
        let kind = error.kind();
        let mut result = Self::new(step_name, StepStatus::Failed, error.to_string());
        result.error_kind = Some(kind);
        result
            .metadata
            .insert("error_kind".to_string(), Value::String(kind.as_str().to_string()));
        result
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Per-step execution attributes
#[derive(Debug, Clone, PartialEq)]
pub struct StepOptions {
    /// Failure of a required step fails the pipeline
    pub required: bool,

    /// Extra attempts after the first one
    pub retry_count: u32,

    /// Bound on a single attempt
    pub timeout: Option<Duration>,

    /// First backoff delay; doubles after every failed attempt
    pub backoff_base: Duration,
}

impl StepOptions {
    pub fn optional() -> Self {
        Self {
            required: false,
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_backoff(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Delay before the attempt following `attempt` (0-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            required: true,
            retry_count: 0,
            timeout: None,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// A unit of pipeline work
///
/// `execute` should only mutate the context once its work is confirmed; a
/// timed-out attempt is dropped mid-flight and nothing is undone for it.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Name, unique within a pipeline
    fn name(&self) -> &str;

    fn options(&self) -> &StepOptions;

    /// Cheap precondition check; must not mutate
    async fn validate_input(&self, _context: &ProcessingContext) -> bool {
        true
    }

    async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError>;

    /// Best-effort undo after a required step exhausted its attempts
    async fn rollback(&self, _context: &mut ProcessingContext, _error: &StepError) {}
}
