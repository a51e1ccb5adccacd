//! Error taxonomy shared by steps, the wrapper and the checkpoint loader

use polars::prelude::PolarsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable classification carried by failed step results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ValidationError")]
    Validation,
    #[serde(rename = "TransientIOError")]
    TransientIo,
    #[serde(rename = "LookupError")]
    Lookup,
    #[serde(rename = "RuleConfigurationError")]
    RuleConfiguration,
    #[serde(rename = "CorruptCheckpoint")]
    CorruptCheckpoint,
    #[serde(rename = "DataError")]
    Data,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::TransientIo => "TransientIOError",
            ErrorKind::Lookup => "LookupError",
            ErrorKind::RuleConfiguration => "RuleConfigurationError",
            ErrorKind::CorruptCheckpoint => "CorruptCheckpoint",
            ErrorKind::Data => "DataError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by step bodies
#[derive(Debug, Error)]
pub enum StepError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O failure: {0}")]
    TransientIo(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("required dataset '{0}' is not available")]
    Lookup(String),

    #[error("invalid rule configuration: {0}")]
    RuleConfiguration(String),

    #[error("checkpoint {id} is corrupt: {reason}")]
    CorruptCheckpoint { id: String, reason: String },

    #[error("data error: {0}")]
    Data(#[from] PolarsError),
}

impl StepError {
    /// Classification recorded on the step result
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Validation(_) => ErrorKind::Validation,
            StepError::TransientIo(_) | StepError::Timeout(_) => ErrorKind::TransientIo,
            StepError::Lookup(_) => ErrorKind::Lookup,
            StepError::RuleConfiguration(_) => ErrorKind::RuleConfiguration,
            StepError::CorruptCheckpoint { .. } => ErrorKind::CorruptCheckpoint,
            StepError::Data(_) => ErrorKind::Data,
        }
    }

    /// Only transient I/O failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }
}
