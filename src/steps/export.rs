//! Export step - writes the evaluated dataset as CSV

use crate::core::{PipelineStep, ProcessingContext, StepError, StepOptions, StepResult};
use async_trait::async_trait;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct ExportStep {
    name: String,
    output_dir: PathBuf,
    options: StepOptions,
}

impl ExportStep {
    pub fn new(name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
            options: StepOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    /// `<ENTITY>_<TYPE>_<YYYYMM>_accrual.csv`
    pub fn file_name(context: &ProcessingContext) -> String {
        let date = context
            .processing_date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());
        format!(
            "{}_{}_{}_accrual.csv",
            context.entity_type().to_uppercase(),
            context.processing_type(),
            date
        )
    }
}

fn write_csv(path: &Path, frame: &DataFrame) -> Result<(), StepError> {
    let mut file = File::create(path).map_err(|e| StepError::TransientIo(format!("{}: {}", path.display(), e)))?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut frame.clone())?;
    Ok(())
}

#[async_trait]
impl PipelineStep for ExportStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &StepOptions {
        &self.options
    }

    async fn validate_input(&self, context: &ProcessingContext) -> bool {
        context.data().width() > 0
    }

    async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| StepError::TransientIo(format!("{}: {}", self.output_dir.display(), e)))?;

        let path = self.output_dir.join(Self::file_name(context));
        let frame = context.data().clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_csv(&target, &frame))
            .await
            .map_err(|e| StepError::TransientIo(e.to_string()))??;

        info!("Exported {} rows to {}", context.data().height(), path.display());
        let exported = path.display().to_string();
        context.set_variable("export_path", exported.clone());

        Ok(StepResult::success(&self.name, format!("Exported to {}", exported)).with_metadata("path", exported))
    }
}
