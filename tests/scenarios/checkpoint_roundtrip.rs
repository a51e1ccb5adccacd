//! Test: checkpoints taken by the engine, reloaded and resumed

use crate::helpers::*;
use accrual_pipeline::core::{PipelineStep, ProcessingContext, StepError, StepOptions, StepResult};
use accrual_pipeline::execution::{ExecutionEngine, ExecutionEvent};
use accrual_pipeline::persistence::{CheckpointError, CheckpointManager};
use async_trait::async_trait;
use polars::prelude::*;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Puts a primary and an auxiliary dataset into the context
struct Seed {
    options: StepOptions,
}

#[async_trait]
impl PipelineStep for Seed {
    fn name(&self) -> &str {
        "Seed"
    }

    fn options(&self) -> &StepOptions {
        &self.options
    }

    async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
        context.update_data(df! {
            "PO#" => &["PO003", "PO001", "PO002"],
            "Entry Amount" => &[Some(1200.5), None, Some(-3.0)],
        }?);
        context.add_auxiliary_data("previous", df! { "PO Line" => &["PO001-1", "PO009-2"] }?);
        context.set_variable("processing_month", 3);
        Ok(StepResult::success("Seed", "seeded"))
    }
}

fn seeded_pipeline() -> accrual_pipeline::core::Pipeline {
    pipeline(
        vec![
            Arc::new(Seed {
                options: StepOptions::default(),
            }),
            Arc::new(MockStep::new("Mark", Behavior::Succeed)),
            Arc::new(MockStep::new("Export", Behavior::Succeed)),
        ],
        true,
    )
}

#[tokio::test]
async fn test_engine_checkpoints_round_trip() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(CheckpointManager::new(dir.path()));
    let saved = Arc::new(Mutex::new(Vec::new()));
    let mut engine = ExecutionEngine::new().with_checkpoints(manager.clone());
    let sink = saved.clone();
    engine.add_event_handler(move |event| {
        if let ExecutionEvent::CheckpointSaved { checkpoint_id, .. } = event {
            sink.lock().unwrap().push(checkpoint_id);
        }
    });
    let mut original = context();

    let run = engine.execute(&seeded_pipeline(), &mut original).await;
    assert!(run.is_success());

    let saved = saved.lock().unwrap().clone();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[1], "SPT_PO_202403_after_Mark");
    assert_eq!(manager.list().unwrap().len(), 3);

    let restored = manager.load("SPT_PO_202403_after_Export").unwrap();
    assert!(restored.data().equals_missing(original.data()));
    assert_eq!(restored.data().get_column_names(), original.data().get_column_names());
    assert!(restored
        .get_auxiliary_data("previous")
        .unwrap()
        .equals_missing(original.get_auxiliary_data("previous").unwrap()));
    assert_eq!(restored.variables(), original.variables());
    assert_eq!(restored.history().len(), 3);
    assert_eq!(restored.processing_date(), Some(202403));
}

#[tokio::test]
async fn test_resume_runs_remaining_steps_only() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(CheckpointManager::new(dir.path()));
    let engine = ExecutionEngine::new().with_checkpoints(manager.clone());
    let mut ctx = context();
    engine.execute(&seeded_pipeline(), &mut ctx).await;

    let id = "SPT_PO_202403_after_Seed";
    let metadata = manager.load_metadata(id).unwrap();
    let mut resumed = manager.load(id).unwrap();
    let remaining = seeded_pipeline().resume_after(&metadata.step_name).unwrap();

    let run = ExecutionEngine::new().execute(&remaining, &mut resumed).await;

    assert!(run.is_success());
    assert_eq!(run.results.len(), 2);
    assert_eq!(run.results[0].step_name, "Mark");
    assert_eq!(resumed.data().height(), 3);
    assert_eq!(resumed.history().len(), 3);
}

#[tokio::test]
async fn test_missing_artifact_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(CheckpointManager::new(dir.path()));
    let engine = ExecutionEngine::new().with_checkpoints(manager.clone());
    let mut ctx = context();
    engine.execute(&seeded_pipeline(), &mut ctx).await;

    let id = "SPT_PO_202403_after_Mark";
    std::fs::remove_file(dir.path().join(id).join("data.parquet")).unwrap();

    let err = manager.load(id).unwrap_err();
    assert!(matches!(err, CheckpointError::Corrupt { .. }));
    let err: StepError = err.into();
    assert!(matches!(err, StepError::CorruptCheckpoint { .. }));

    assert!(matches!(manager.load("SPT_PO_202403_after_Nothing"), Err(CheckpointError::NotFound(_))));
}

#[tokio::test]
async fn test_similar_step_names_keep_separate_checkpoints() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(CheckpointManager::new(dir.path()));
    let engine = ExecutionEngine::new().with_checkpoints(manager.clone());
    let similar = pipeline(
        vec![
            Arc::new(MockStep::new("Post Process", Behavior::Succeed)),
            Arc::new(MockStep::new("Post_Process", Behavior::Succeed)),
        ],
        true,
    );
    let mut ctx = context();

    assert!(engine.execute(&similar, &mut ctx).await.is_success());

    let listings = manager.list().unwrap();
    assert_eq!(listings.len(), 2);
    let steps: Vec<_> = listings
        .iter()
        .filter_map(|l| l.metadata.as_ref().map(|m| m.step_name.clone()))
        .collect();
    assert!(steps.contains(&"Post Process".to_string()));
    assert!(steps.contains(&"Post_Process".to_string()));
}
