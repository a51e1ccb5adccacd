//! Closed set of step kinds buildable from configuration

use crate::core::{AppConfig, PipelineStep, ProcessingType, StepError};
use crate::source::{FetchPool, FilePaths, ResourceReader};
use crate::steps::{
    default_rules, DataShapeSummary, DateLogicStep, ErmStrategy, EvaluationStep, ExportStep, IntegrationStep,
    LoadingStep, PreviousWorkpaper, ProcurementWorkpaper, PurchaseOrderLoading, PurchaseRequestLoading,
};
use std::sync::Arc;

/// Everything a step constructor may need
pub struct StepFactory<'a> {
    pub config: &'a AppConfig,
    pub entity: &'a str,
    pub processing_type: ProcessingType,
    pub file_paths: &'a FilePaths,
    pub reader: Arc<dyn ResourceReader>,
    pub pool: FetchPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    DataLoading,
    PreviousWorkpaperIntegration,
    ProcurementIntegration,
    DateLogic,
    ErmEvaluation,
    DataShapeSummary,
    Export,
}

impl StepKind {
    pub const ALL: [StepKind; 7] = [
        StepKind::DataLoading,
        StepKind::PreviousWorkpaperIntegration,
        StepKind::ProcurementIntegration,
        StepKind::DateLogic,
        StepKind::ErmEvaluation,
        StepKind::DataShapeSummary,
        StepKind::Export,
    ];

    /// Used when an entity configures no steps
    pub const DEFAULT_ORDER: [StepKind; 4] = [
        StepKind::DataLoading,
        StepKind::DateLogic,
        StepKind::ErmEvaluation,
        StepKind::Export,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StepKind::DataLoading => "DataLoading",
            StepKind::PreviousWorkpaperIntegration => "PreviousWorkpaperIntegration",
            StepKind::ProcurementIntegration => "ProcurementIntegration",
            StepKind::DateLogic => "DateLogic",
            StepKind::ErmEvaluation => "ErmEvaluation",
            StepKind::DataShapeSummary => "DataShapeSummary",
            StepKind::Export => "Export",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name.trim())
    }

    pub fn description(&self) -> &'static str {
        match self {
            StepKind::DataLoading => "Load the primary dataset, auxiliary files and reference data",
            StepKind::PreviousWorkpaperIntegration => "Merge last month's FN and procurement remarks by line",
            StepKind::ProcurementIntegration => "Merge the procurement workpaper remarks by line",
            StepKind::DateLogic => "Convert ERM and extract description date ranges",
            StepKind::ErmEvaluation => "Assign statuses from the decision table and set accounting fields",
            StepKind::DataShapeSummary => "Record the shape of every dataset",
            StepKind::Export => "Write the result to the output directory",
        }
    }

    fn required_by_default(&self) -> bool {
        !matches!(
            self,
            StepKind::DataShapeSummary | StepKind::PreviousWorkpaperIntegration | StepKind::ProcurementIntegration
        )
    }

    pub fn build(&self, factory: &StepFactory<'_>) -> Result<Arc<dyn PipelineStep>, StepError> {
        let config = factory.config;
        let name = self.name();
        let options = config.step_options(name, self.required_by_default());
        let profile = config.entity_profile(factory.entity);

        let step: Arc<dyn PipelineStep> = match self {
            StepKind::DataLoading => match factory.processing_type {
                ProcessingType::Po => Arc::new(
                    LoadingStep::new(
                        name,
                        PurchaseOrderLoading,
                        factory.file_paths.clone(),
                        factory.reader.clone(),
                        factory.pool.clone(),
                    )
                    .with_profile(profile)
                    .with_options(options),
                ),
                ProcessingType::Pr => Arc::new(
                    LoadingStep::new(
                        name,
                        PurchaseRequestLoading,
                        factory.file_paths.clone(),
                        factory.reader.clone(),
                        factory.pool.clone(),
                    )
                    .with_profile(profile)
                    .with_options(options),
                ),
            },
            StepKind::PreviousWorkpaperIntegration => {
                Arc::new(IntegrationStep::new(name, PreviousWorkpaper).with_options(options))
            }
            StepKind::ProcurementIntegration => {
                Arc::new(IntegrationStep::new(name, ProcurementWorkpaper).with_options(options))
            }
            StepKind::DateLogic => Arc::new(DateLogicStep::new(name, &config.date_patterns)?.with_options(options)),
            StepKind::ErmEvaluation => {
                let rules = match config.rules_for(factory.entity) {
                    Some(rules) => rules.to_vec(),
                    None => default_rules()?,
                };
                Arc::new(
                    EvaluationStep::new(name, ErmStrategy::new(profile), &rules, config.unparseable_date_range)?
                        .with_options(options),
                )
            }
            StepKind::DataShapeSummary => Arc::new(DataShapeSummary::new(name).with_options(options)),
            StepKind::Export => Arc::new(ExportStep::new(name, config.output_dir.clone()).with_options(options)),
        };
        Ok(step)
    }
}
