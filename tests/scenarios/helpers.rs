//! Shared fixtures for scenario tests

use accrual_pipeline::core::{
    Pipeline, PipelineStep, ProcessingContext, ProcessingType, StepError, StepOptions, StepResult,
};
use accrual_pipeline::source::{ReadParams, ResourceReader, SourceError};
use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a [`MockStep`] does on each attempt
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    /// Fail with a transient error on the first `n` attempts, then succeed
    FlakyFor(usize),
    AlwaysTransient,
    AlwaysLookup,
    /// Sleep longer than any sensible timeout
    Hang,
}

/// Step counting its attempts and rollbacks
pub struct MockStep {
    name: String,
    options: StepOptions,
    behavior: Behavior,
    pub attempts: Arc<AtomicUsize>,
    pub rollbacks: Arc<AtomicUsize>,
}

impl MockStep {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            options: StepOptions::default().with_backoff(Duration::from_millis(1)),
            behavior,
            attempts: Arc::new(AtomicUsize::new(0)),
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options.with_backoff(Duration::from_millis(1));
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineStep for MockStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &StepOptions {
        &self.options
    }

    async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => {}
            Behavior::FlakyFor(n) if attempt < n => {
                return Err(StepError::TransientIo(format!("{} attempt {}", self.name, attempt + 1)))
            }
            Behavior::FlakyFor(_) => {}
            Behavior::AlwaysTransient => return Err(StepError::TransientIo("connection reset".into())),
            Behavior::AlwaysLookup => return Err(StepError::Lookup("reference_account".into())),
            Behavior::Hang => tokio::time::sleep(Duration::from_secs(30)).await,
        }
        context.set_variable(format!("ran_{}", self.name), true);
        Ok(StepResult::success(&self.name, "ok"))
    }

    async fn rollback(&self, _context: &mut ProcessingContext, _error: &StepError) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn pipeline(steps: Vec<Arc<dyn PipelineStep>>, stop_on_error: bool) -> Pipeline {
    Pipeline::builder("SPT_PO_Processing")
        .entity_type("SPT")
        .stop_on_error(stop_on_error)
        .steps(steps)
        .build()
        .unwrap()
}

pub fn context() -> ProcessingContext {
    ProcessingContext::new("SPT", ProcessingType::Po).with_processing_date(202403)
}

/// Reader serving frames by file name, failing for selected names
#[derive(Default)]
pub struct MockReader {
    frames: HashMap<String, DataFrame>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    pub closes: AtomicUsize,
    /// Reads that ran to the end
    pub completed: AtomicUsize,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, file_name: &str, frame: DataFrame) -> Self {
        self.frames.insert(file_name.to_string(), frame);
        self
    }

    pub fn fail(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ResourceReader for MockReader {
    async fn read(&self, path: &Path, _params: &ReadParams) -> Result<DataFrame, SourceError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tokio::time::sleep(self.delay.unwrap_or(Duration::from_millis(5))).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&name) {
            return Err(SourceError::Io {
                path: path.to_path_buf(),
                message: "simulated read failure".into(),
            });
        }
        self.frames
            .get(&name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_path_buf()))
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Create an empty file so path resolution succeeds
pub fn touch(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, "").unwrap();
    path.display().to_string()
}
