//! Concrete pipeline steps

pub mod dates;
pub mod erm;
pub mod evaluation;
pub mod export;
pub mod integration;
pub mod loading;
pub mod summary;

pub use dates::DateLogicStep;
pub use erm::{default_rules, ErmStrategy};
pub use evaluation::{accrual_flags, EvaluationStep, EvaluationStrategy};
pub use export::ExportStep;
pub use integration::{IntegrationStep, IntegrationStrategy, PreviousWorkpaper, ProcurementWorkpaper};
pub use loading::{LoadingStep, LoadingStrategy, PurchaseOrderLoading, PurchaseRequestLoading};
pub use summary::DataShapeSummary;
