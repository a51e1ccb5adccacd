//! Execution state models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a single step result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    /// Step has not started
    Pending,
    /// Step is currently running
    Running,
    /// Step completed successfully
    Success,
    /// Step failed (validation or all attempts exhausted)
    Failed,
    /// Step was skipped because its input did not validate
    Skipped,
}

impl StepStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed | StepStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Running => "RUNNING",
            StepStatus::Success => "SUCCESS",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every required step succeeded
    Completed,
    /// A required step failed
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Running" => Ok(ExecutionStatus::Running),
            "Completed" => Ok(ExecutionStatus::Completed),
            "Failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// Which kind of procurement record a run processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingType {
    #[serde(rename = "PO", alias = "po")]
    Po,
    #[serde(rename = "PR", alias = "pr")]
    Pr,
}

impl ProcessingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingType::Po => "PO",
            ProcessingType::Pr => "PR",
        }
    }

    /// Column holding the assigned status
    pub fn status_column(&self) -> &'static str {
        match self {
            ProcessingType::Po => "PO狀態",
            ProcessingType::Pr => "PR狀態",
        }
    }

    /// Column holding the document number
    pub fn id_column(&self) -> &'static str {
        match self {
            ProcessingType::Po => "PO#",
            ProcessingType::Pr => "PR#",
        }
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PO" => Ok(ProcessingType::Po),
            "PR" => Ok(ProcessingType::Pr),
            other => Err(format!("unknown processing type: {}", other)),
        }
    }
}
