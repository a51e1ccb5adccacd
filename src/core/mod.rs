//! Core domain models

pub mod columns;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod state;
pub mod step;

pub use condition::{
    CheckConfig, Combine, ConditionEngine, ConditionInput, ConditionSet, RuleConfig, RuleHit,
    StatusAssignment,
};
pub use config::{AppConfig, EntityProfile, UnparseableRangePolicy};
pub use context::{ContextMetadata, ProcessingContext};
pub use error::{ErrorKind, StepError};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineRun, StepObserver, StepProgress};
pub use state::{ExecutionStatus, ProcessingType, StepStatus};
pub use step::{PipelineStep, StepOptions, StepResult};
