//! Pipeline orchestrator - builds pipelines from per-entity step lists

pub mod registry;

pub use registry::{StepFactory, StepKind};

use crate::core::{AppConfig, Pipeline, PipelineStep, ProcessingType, StepError};
use crate::source::{FetchPool, FilePaths, ResourceReader};
use std::sync::Arc;
use tracing::{info, warn};

pub struct PipelineOrchestrator {
    config: Arc<AppConfig>,
    reader: Arc<dyn ResourceReader>,
    pool: FetchPool,
}

impl PipelineOrchestrator {
    pub fn new(config: Arc<AppConfig>, reader: Arc<dyn ResourceReader>, pool: FetchPool) -> Self {
        Self { config, reader, pool }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Step names that `build` would try, in order
    pub fn enabled_steps(&self, entity: &str, processing_type: ProcessingType) -> Vec<String> {
        let configured = self.config.configured_steps(entity, processing_type);
        if configured.is_empty() {
            StepKind::DEFAULT_ORDER.iter().map(|k| k.name().to_string()).collect()
        } else {
            configured.to_vec()
        }
    }

    /// Build the pipeline for an entity and processing type
    ///
    /// Unknown step names are skipped with a warning; `custom_steps` run after
    /// the configured ones.
    pub fn build(
        &self,
        entity: &str,
        processing_type: ProcessingType,
        file_paths: &FilePaths,
        custom_steps: Vec<Arc<dyn PipelineStep>>,
    ) -> Result<Pipeline, StepError> {
        if self.config.configured_steps(entity, processing_type).is_empty() {
            info!("No steps configured for {}/{}, using default order", entity, processing_type);
        }

        let factory = StepFactory {
            config: &self.config,
            entity,
            processing_type,
            file_paths,
            reader: self.reader.clone(),
            pool: self.pool.clone(),
        };

        let mut steps = Vec::new();
        for name in self.enabled_steps(entity, processing_type) {
            match StepKind::from_name(&name) {
                Some(kind) => steps.push(kind.build(&factory)?),
                None => warn!("Unknown step '{}' for {}/{}, skipping", name, entity, processing_type),
            }
        }

        let custom_count = custom_steps.len();
        let pipeline = Pipeline::builder(format!("{}_{}_Processing", entity.to_uppercase(), processing_type))
            .entity_type(entity)
            .description(format!("{} {} accrual processing", entity.to_uppercase(), processing_type))
            .stop_on_error(self.config.defaults.stop_on_error)
            .steps(steps)
            .steps(custom_steps)
            .build()?;

        info!(
            "Built {} with {} steps ({} custom)",
            pipeline.name(),
            pipeline.len(),
            custom_count
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ProcessingContext, StepOptions, StepResult};
    use crate::source::CsvReader;
    use async_trait::async_trait;

    struct Marker {
        options: StepOptions,
    }

    #[async_trait]
    impl PipelineStep for Marker {
        fn name(&self) -> &str {
            "Marker"
        }

        fn options(&self) -> &StepOptions {
            &self.options
        }

        async fn execute(&self, _context: &mut ProcessingContext) -> Result<StepResult, StepError> {
            Ok(StepResult::success("Marker", "marked"))
        }
    }

    fn orchestrator(yaml: &str) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            Arc::new(AppConfig::from_yaml(yaml).unwrap()),
            Arc::new(CsvReader::new()),
            FetchPool::new(2),
        )
    }

    #[test]
    fn test_configured_list_with_unknown_and_custom_steps() {
        let orchestrator = orchestrator(
            r#"
pipelines:
  SPT:
    pr: [DataLoading, SPTPostProcessing, DateLogic]
defaults:
  stop_on_error: false
"#,
        );
        let custom: Vec<Arc<dyn PipelineStep>> = vec![Arc::new(Marker {
            options: StepOptions::default(),
        })];

        let pipeline = orchestrator
            .build("SPT", ProcessingType::Pr, &FilePaths::new(), custom)
            .unwrap();

        assert_eq!(pipeline.step_names(), vec!["DataLoading", "DateLogic", "Marker"]);
        assert_eq!(pipeline.name(), "SPT_PR_Processing");
        assert!(!pipeline.stop_on_error());
    }

    #[test]
    fn test_sample_config_builds_every_pipeline() {
        let orchestrator = orchestrator(include_str!("../../config/accrual.yaml"));

        let spt = orchestrator
            .build("SPT", ProcessingType::Po, &FilePaths::new(), Vec::new())
            .unwrap();
        let spx = orchestrator
            .build("SPX", ProcessingType::Po, &FilePaths::new(), Vec::new())
            .unwrap();

        assert_eq!(spt.len(), 7);
        assert_eq!(
            spx.step_names(),
            vec![
                "DataLoading",
                "PreviousWorkpaperIntegration",
                "ProcurementIntegration",
                "DateLogic",
                "ErmEvaluation",
                "Export"
            ]
        );
    }

    #[test]
    fn test_invalid_rule_set_fails_build() {
        let orchestrator = orchestrator(
            r#"
entities:
  SPX:
    rule_set: spx
rules:
  spx:
    - priority: 1
      status: "Affiliate"
      checks:
        - type: condition
          name: not_a_condition
"#,
        );

        let err = orchestrator
            .build("SPX", ProcessingType::Po, &FilePaths::new(), Vec::new())
            .unwrap_err();

        assert!(matches!(err, StepError::RuleConfiguration(_)));
    }
}
