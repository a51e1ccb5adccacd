//! Test: pipeline construction from configuration

use crate::helpers::*;
use accrual_pipeline::core::{AppConfig, PipelineStep, ProcessingType};
use accrual_pipeline::orchestrator::{PipelineOrchestrator, StepKind};
use accrual_pipeline::source::{CsvReader, FetchPool, FilePaths};
use std::sync::Arc;

fn orchestrator(config: AppConfig) -> PipelineOrchestrator {
    PipelineOrchestrator::new(Arc::new(config), Arc::new(CsvReader::new()), FetchPool::new(4))
}

#[test]
fn test_empty_list_falls_back_to_default_order() {
    let orchestrator = orchestrator(AppConfig::default());

    let pipeline = orchestrator
        .build("X", ProcessingType::Po, &FilePaths::new(), Vec::new())
        .unwrap();

    assert_eq!(pipeline.len(), StepKind::DEFAULT_ORDER.len());
    assert_eq!(
        pipeline.step_names(),
        vec!["DataLoading", "DateLogic", "ErmEvaluation", "Export"]
    );
    assert_eq!(pipeline.name(), "X_PO_Processing");
}

#[test]
fn test_custom_steps_follow_configured_ones() {
    let config = AppConfig::from_yaml(
        r#"
pipelines:
  SPT:
    po: [DataLoading, DataShapeSummary]
"#,
    )
    .unwrap();
    let orchestrator = orchestrator(config);
    let custom: Vec<Arc<dyn PipelineStep>> = vec![
        Arc::new(MockStep::new("Notify", Behavior::Succeed)),
        Arc::new(MockStep::new("Archive", Behavior::Succeed)),
    ];

    let pipeline = orchestrator
        .build("spt", ProcessingType::Po, &FilePaths::new(), custom)
        .unwrap();

    assert_eq!(
        pipeline.step_names(),
        vec!["DataLoading", "DataShapeSummary", "Notify", "Archive"]
    );
    // PR has no list of its own
    assert_eq!(orchestrator.enabled_steps("SPT", ProcessingType::Pr).len(), 4);
}

#[test]
fn test_only_unknown_names_gives_empty_pipeline() {
    let config = AppConfig::from_yaml(
        r#"
pipelines:
  SPX:
    pr: [SPXDepositCheck, SPXKioskMapping]
"#,
    )
    .unwrap();

    let pipeline = orchestrator(config)
        .build("SPX", ProcessingType::Pr, &FilePaths::new(), Vec::new())
        .unwrap();

    assert!(pipeline.is_empty());
}
