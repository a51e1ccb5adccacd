//! Persistence: checkpoints and run history

pub mod checkpoint;
#[cfg(feature = "sqlite")]
pub mod store;

pub use checkpoint::{CheckpointError, CheckpointListing, CheckpointManager, CheckpointMetadata};
#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{PipelineRun, ProcessingContext};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub entity_type: String,

    /// "PO" or "PR"
    pub processing_type: String,

    /// YYYYMM, when known
    pub processing_date: Option<u32>,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub total_steps: usize,

    pub succeeded: usize,

    pub failed: usize,

    pub skipped: usize,

    /// First failed step, if any
    pub failed_step: Option<String>,
}

impl RunSummary {
    pub fn duration_secs(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Storage for run summaries
#[async_trait::async_trait]
pub trait RunHistoryStore: Send + Sync {
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>>;

    /// Runs newest first, optionally for one entity
    async fn list_runs(&self, entity_type: Option<&str>) -> Result<Vec<RunSummary>>;

    async fn list_entities(&self) -> Result<Vec<String>>;
}

/// In-memory history (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RunHistoryStore for InMemoryRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.execution_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&execution_id).cloned())
    }

    async fn list_runs(&self, entity_type: Option<&str>) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|run| entity_type.map_or(true, |e| run.entity_type.eq_ignore_ascii_case(e)))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_entities(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut entities: Vec<String> = runs.values().map(|run| run.entity_type.clone()).collect();
        entities.sort();
        entities.dedup();
        Ok(entities)
    }
}

/// Create a summary from a finished run
pub fn create_summary(run: &PipelineRun, context: &ProcessingContext) -> RunSummary {
    RunSummary {
        execution_id: run.execution_id,
        pipeline_name: run.pipeline_name.clone(),
        entity_type: context.entity_type().to_string(),
        processing_type: context.processing_type().to_string(),
        processing_date: context.processing_date(),
        status: run.status,
        started_at: run.started_at,
        completed_at: run.completed_at,
        total_steps: run.results.len(),
        succeeded: run.succeeded(),
        failed: run.failed(),
        skipped: run.skipped(),
        failed_step: run
            .results
            .iter()
            .find(|result| result.is_failed())
            .map(|result| result.step_name.clone()),
    }
}
