//! accrual-pipeline - monthly PO/PR accrual reconciliation

pub mod cli;
pub mod core;
pub mod execution;
pub mod orchestrator;
pub mod persistence;
pub mod source;
pub mod steps;

// Re-export commonly used types
pub use self::core::{
    AppConfig, ConditionEngine, ExecutionStatus, Pipeline, PipelineRun, PipelineStep, ProcessingContext,
    ProcessingType, StepError, StepOptions, StepResult, StepStatus,
};
pub use self::execution::{ExecutionEngine, ExecutionEvent};
pub use self::orchestrator::{PipelineOrchestrator, StepKind};
pub use self::persistence::{CheckpointManager, RunHistoryStore, RunSummary};
pub use self::source::{CsvReader, FetchPool, FilePaths, FileSpec, ResourceReader};
