//! Main execution engine - runs a pipeline, emits events and saves checkpoints

use crate::{
    core::{
        ExecutionStatus, Pipeline, PipelineRun, ProcessingContext, StepObserver, StepProgress,
        StepResult, StepStatus,
    },
    persistence::CheckpointManager,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_name: String,
        index: usize,
        total: usize,
    },
    StepFinished {
        step_name: String,
        index: usize,
        total: usize,
        status: StepStatus,
        message: String,
        duration_secs: f64,
    },
    CheckpointSaved {
        step_name: String,
        checkpoint_id: String,
    },
    CheckpointFailed {
        step_name: String,
        error: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        pipeline_name: String,
        status: ExecutionStatus,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Pipeline execution engine
#[derive(Default)]
pub struct ExecutionEngine {
    event_handlers: Vec<EventHandler>,
    checkpoints: Option<Arc<CheckpointManager>>,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a checkpoint after every successful step
    pub fn with_checkpoints(mut self, manager: Arc<CheckpointManager>) -> Self {
        self.checkpoints = Some(manager);
        self
    }

    pub fn checkpoints(&self) -> Option<&CheckpointManager> {
        self.checkpoints.as_deref()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    pub async fn execute(&self, pipeline: &Pipeline, context: &mut ProcessingContext) -> PipelineRun {
        info!(
            "Running {} for {}/{}",
            pipeline.name(),
            context.entity_type(),
            context.processing_type()
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            pipeline_name: pipeline.name().to_string(),
            total_steps: pipeline.len(),
        });

        let run = pipeline.execute_with(context, self).await;

        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: run.execution_id,
            pipeline_name: run.pipeline_name.clone(),
            status: run.status,
            succeeded: run.succeeded(),
            failed: run.failed(),
            skipped: run.skipped(),
        });
        run
    }

    /// Snapshot the context on the blocking pool; parquet and fs writes never run on the executor
    async fn save_checkpoint(&self, step_name: &str, context: &ProcessingContext) {
        let Some(manager) = self.checkpoints.clone() else {
            return;
        };

        let snapshot = context.clone();
        let step = step_name.to_string();
        let saved = task::spawn_blocking(move || manager.save(&snapshot, &step, BTreeMap::new()))
            .await
            .map_err(|e| e.to_string())
            .and_then(|outcome| outcome.map_err(|e| e.to_string()));

        match saved {
            Ok(checkpoint_id) => self.emit_event(ExecutionEvent::CheckpointSaved {
                step_name: step_name.to_string(),
                checkpoint_id,
            }),
            Err(error) => {
                warn!("Checkpoint after {} failed: {}", step_name, error);
                self.emit_event(ExecutionEvent::CheckpointFailed {
                    step_name: step_name.to_string(),
                    error,
                });
            }
        }
    }
}

#[async_trait]
impl StepObserver for ExecutionEngine {
    async fn step_started(&self, progress: StepProgress<'_>) {
        self.emit_event(ExecutionEvent::StepStarted {
            step_name: progress.step_name.to_string(),
            index: progress.index,
            total: progress.total,
        });
    }

    async fn step_finished(
        &self,
        progress: StepProgress<'_>,
        result: &StepResult,
        context: &ProcessingContext,
    ) {
        self.emit_event(ExecutionEvent::StepFinished {
            step_name: progress.step_name.to_string(),
            index: progress.index,
            total: progress.total,
            status: result.status,
            message: result.message.clone(),
            duration_secs: result.duration_secs,
        });

        if result.is_success() {
            self.save_checkpoint(progress.step_name, context).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineStep, ProcessingType, StepError, StepOptions};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Named {
        name: &'static str,
        options: StepOptions,
        fail: bool,
    }

    impl Named {
        fn ok(name: &'static str) -> Arc<dyn PipelineStep> {
            Arc::new(Self { name, options: StepOptions::default(), fail: false })
        }

        fn failing(name: &'static str) -> Arc<dyn PipelineStep> {
            Arc::new(Self { name, options: StepOptions::default(), fail: true })
        }
    }

    #[async_trait]
    impl PipelineStep for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn options(&self) -> &StepOptions {
            &self.options
        }

        async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
            if self.fail {
                return Err(StepError::Validation("bad input".into()));
            }
            context.set_variable(self.name, true);
            Ok(StepResult::success(self.name, "ok"))
        }
    }

    fn recorder(engine: &mut ExecutionEngine) -> Arc<Mutex<Vec<String>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| {
            let label = match event {
                ExecutionEvent::PipelineStarted { .. } => "pipeline_started".to_string(),
                ExecutionEvent::StepStarted { step_name, .. } => format!("started:{}", step_name),
                ExecutionEvent::StepFinished { step_name, status, .. } => {
                    format!("finished:{}:{}", step_name, status)
                }
                ExecutionEvent::CheckpointSaved { step_name, .. } => format!("checkpoint:{}", step_name),
                ExecutionEvent::CheckpointFailed { step_name, .. } => {
                    format!("checkpoint_failed:{}", step_name)
                }
                ExecutionEvent::PipelineCompleted { status, .. } => format!("completed:{}", status.as_str()),
            };
            sink.lock().unwrap().push(label);
        });
        events
    }

    #[tokio::test]
    async fn test_events_follow_step_order() {
        let pipeline = Pipeline::builder("demo")
            .step(Named::ok("A"))
            .step(Named::ok("B"))
            .build()
            .unwrap();
        let mut engine = ExecutionEngine::new();
        let events = recorder(&mut engine);
        let mut context = ProcessingContext::new("SPT", ProcessingType::Po);

        let run = engine.execute(&pipeline, &mut context).await;

        assert!(run.is_success());
        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "pipeline_started",
                "started:A",
                "finished:A:SUCCESS",
                "started:B",
                "finished:B:SUCCESS",
                "completed:Completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_checkpoints_only_after_success() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(CheckpointManager::new(dir.path()));
        let pipeline = Pipeline::builder("demo")
            .step(Named::ok("A"))
            .step(Named::failing("B"))
            .step(Named::ok("C"))
            .build()
            .unwrap();
        let mut engine = ExecutionEngine::new().with_checkpoints(manager.clone());
        let events = recorder(&mut engine);
        let mut context = ProcessingContext::new("SPT", ProcessingType::Po).with_processing_date(202403);

        let run = engine.execute(&pipeline, &mut context).await;

        assert_eq!(run.status, ExecutionStatus::Failed);
        assert_eq!(run.results.len(), 2);
        let ids: Vec<_> = manager.list().unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["SPT_PO_202403_after_A"]);
        assert!(events.lock().unwrap().contains(&"checkpoint:A".to_string()));
    }

    #[tokio::test]
    async fn test_checkpoint_failure_is_reported_and_run_continues() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("not_a_dir");
        std::fs::write(&blocked, b"").unwrap();
        let pipeline = Pipeline::builder("demo")
            .step(Named::ok("A"))
            .step(Named::ok("B"))
            .build()
            .unwrap();
        let mut engine = ExecutionEngine::new().with_checkpoints(Arc::new(CheckpointManager::new(&blocked)));
        let events = recorder(&mut engine);
        let mut context = ProcessingContext::new("SPT", ProcessingType::Po).with_processing_date(202403);

        let run = engine.execute(&pipeline, &mut context).await;

        assert!(run.is_success());
        let events = events.lock().unwrap().clone();
        assert!(events.contains(&"checkpoint_failed:A".to_string()));
        assert!(events.contains(&"checkpoint_failed:B".to_string()));
        assert_eq!(context.get_variable("B"), Some(&serde_json::Value::Bool(true)));
    }
}
