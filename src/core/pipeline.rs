//! Ordered step sequence and its execution loop

use crate::core::{ExecutionStatus, PipelineStep, ProcessingContext, StepError, StepResult, StepStatus};
use crate::execution::StepExecutor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Position of a step within a run
#[derive(Debug, Clone, Copy)]
pub struct StepProgress<'a> {
    pub step_name: &'a str,
    /// 0-based position
    pub index: usize,
    pub total: usize,
}

/// Hook invoked around every step of a run
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn step_started(&self, _progress: StepProgress<'_>) {}

    async fn step_finished(
        &self,
        progress: StepProgress<'_>,
        result: &StepResult,
        context: &ProcessingContext,
    );
}

struct NoopObserver;

#[async_trait]
impl StepObserver for NoopObserver {
    async fn step_finished(
        &self,
        _progress: StepProgress<'_>,
        _result: &StepResult,
        _context: &ProcessingContext,
    ) {
    }
}

/// Outcome of one pipeline execution
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    /// One entry per executed step, in order
    pub results: Vec<StepResult>,
    pub status: ExecutionStatus,
    /// A required failure stopped the run early
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Immutable, ordered set of steps
pub struct Pipeline {
    name: String,
    entity_type: String,
    description: String,
    stop_on_error: bool,
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .field("stop_on_error", &self.stop_on_error)
            .field("steps", &self.step_names())
            .finish()
    }
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn steps(&self) -> &[Arc<dyn PipelineStep>] {
        &self.steps
    }

    /// Pipeline holding only the steps after `step_name`
    pub fn resume_after(&self, step_name: &str) -> Option<Pipeline> {
        let position = self.steps.iter().position(|s| s.name() == step_name)?;
        Some(Pipeline {
            name: self.name.clone(),
            entity_type: self.entity_type.clone(),
            description: self.description.clone(),
            stop_on_error: self.stop_on_error,
            steps: self.steps[position + 1..].to_vec(),
        })
    }

    /// Run every step in order
    pub async fn execute(&self, context: &mut ProcessingContext) -> PipelineRun {
        self.execute_with(context, &NoopObserver).await
    }

    /// Run every step in order, reporting progress to `observer`
    pub async fn execute_with(
        &self,
        context: &mut ProcessingContext,
        observer: &dyn StepObserver,
    ) -> PipelineRun {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let executor = StepExecutor::new();
        let total = self.steps.len();

        info!("Starting pipeline {} ({} steps)", self.name, total);

        let mut results = Vec::with_capacity(total);
        let mut required_failed = false;
        let mut aborted = false;

        for (index, step) in self.steps.iter().enumerate() {
            let progress = StepProgress {
                step_name: step.name(),
                index,
                total,
            };
            observer.step_started(progress).await;

            let result = executor.run(step.as_ref(), context).await;
            observer.step_finished(progress, &result, context).await;

            let failed = result.is_failed();
            results.push(result);

            if !failed {
                continue;
            }
            if !step.options().required {
                warn!("Optional step {} failed, continuing", step.name());
                continue;
            }

            required_failed = true;
            if self.stop_on_error {
                error!("Required step {} failed, stopping pipeline {}", step.name(), self.name);
                aborted = true;
                break;
            }
            warn!("Required step {} failed, continuing", step.name());
        }

        let status = if required_failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        info!("Pipeline {} finished: {:?}", self.name, status);

        PipelineRun {
            execution_id,
            pipeline_name: self.name.clone(),
            results,
            status,
            aborted,
            started_at,
            completed_at: Utc::now(),
        }
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    name: String,
    entity_type: String,
    description: String,
    stop_on_error: bool,
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: String::new(),
            description: String::new(),
            stop_on_error: true,
            steps: Vec::new(),
        }
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Arc<dyn PipelineStep>>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Finish the pipeline; step names must be unique
    pub fn build(self) -> Result<Pipeline, StepError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name().to_string()) {
                return Err(StepError::Validation(format!(
                    "duplicate step name '{}' in pipeline {}",
                    step.name(),
                    self.name
                )));
            }
        }

        Ok(Pipeline {
            name: self.name,
            entity_type: self.entity_type,
            description: self.description,
            stop_on_error: self.stop_on_error,
            steps: self.steps,
        })
    }
}
