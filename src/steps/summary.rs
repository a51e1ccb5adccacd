//! Shape summary of every dataset in the context

use crate::core::{PipelineStep, ProcessingContext, StepError, StepOptions, StepResult};
use async_trait::async_trait;
use polars::prelude::*;
use tracing::info;

/// Auxiliary dataset written by [`DataShapeSummary`]
pub const SHAPE_SUMMARY: &str = "shape_summary";

pub struct DataShapeSummary {
    name: String,
    options: StepOptions,
}

impl DataShapeSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: StepOptions::optional(),
        }
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl PipelineStep for DataShapeSummary {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &StepOptions {
        &self.options
    }

    async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
        let mut names = vec!["data".to_string()];
        let mut rows = vec![context.data().height() as u64];
        let mut columns = vec![context.data().width() as u64];

        for (name, frame) in context.auxiliary_data() {
            if name == SHAPE_SUMMARY {
                continue;
            }
            names.push(name.clone());
            rows.push(frame.height() as u64);
            columns.push(frame.width() as u64);
        }

        let summary = DataFrame::new(vec![
            Column::new("dataset".into(), names),
            Column::new("rows".into(), rows),
            Column::new("columns".into(), columns),
        ])?;
        let datasets = summary.height();
        info!("Shape summary over {} datasets", datasets);
        context.add_auxiliary_data(SHAPE_SUMMARY, summary);

        Ok(StepResult::success(&self.name, format!("Summarized {} datasets", datasets)))
    }
}
