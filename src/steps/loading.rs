//! Loading step - concurrent acquisition of the primary and auxiliary datasets
//!
//! The driver is shared by every entity. A [`LoadingStrategy`] decides which
//! file key is primary, how the primary payload is shaped and how reference
//! data is populated.

use crate::core::columns::{
    GL_ACCOUNT, LINE_NUMBER, PO_LINE, PR_LINE, REFERENCE_ACCOUNT, REFERENCE_LIABILITY, REF_ACCOUNT, REF_ACCOUNT_DESC,
};
use crate::core::frame::{is_blank, missing_columns, parse_number, set_text_column, text_column};
use crate::core::{EntityProfile, PipelineStep, ProcessingContext, StepError, StepOptions, StepResult};
use crate::source::{normalize_paths, FetchPool, FileEntry, FilePaths, ReadParams, ResourceReader};
use async_trait::async_trait;
use chrono::{Datelike, Local};
use polars::prelude::*;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// GL account used when the source has none
const PLACEHOLDER_GL: &str = "666666";

/// Entity-specific hooks of the loading step
#[async_trait]
pub trait LoadingStrategy: Send + Sync {
    /// File key of the primary dataset
    fn primary_key(&self) -> &str;

    /// Shape the raw primary dataset
    fn interpret_primary(&self, frame: DataFrame) -> Result<DataFrame, StepError>;

    /// Check the shaped primary dataset
    fn validate(&self, frame: &DataFrame) -> Result<(), StepError>;

    /// Populate reference datasets; returns how many were added
    async fn load_reference(
        &self,
        context: &mut ProcessingContext,
        reader: &dyn ResourceReader,
        profile: &EntityProfile,
    ) -> Result<usize, StepError> {
        load_account_mapping(context, reader, profile).await
    }
}

/// Generic loading driver
pub struct LoadingStep<S> {
    name: String,
    strategy: S,
    file_paths: FilePaths,
    reader: Arc<dyn ResourceReader>,
    pool: FetchPool,
    profile: EntityProfile,
    options: StepOptions,
}

impl<S: LoadingStrategy> LoadingStep<S> {
    pub fn new(
        name: impl Into<String>,
        strategy: S,
        file_paths: FilePaths,
        reader: Arc<dyn ResourceReader>,
        pool: FetchPool,
    ) -> Self {
        Self {
            name: name.into(),
            strategy,
            file_paths,
            reader,
            pool,
            profile: EntityProfile::default(),
            options: StepOptions::default(),
        }
    }

    pub fn with_profile(mut self, profile: EntityProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    /// Keep entries whose file exists; fail on a missing required one
    async fn resolve_entries(&self) -> Result<Vec<FileEntry>, StepError> {
        let mut resolved = Vec::new();
        for entry in normalize_paths(&self.file_paths) {
            let required = entry.key == self.strategy.primary_key() || entry.required.unwrap_or(false);
            let readable = tokio::fs::metadata(&entry.path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);

            if readable {
                resolved.push(entry);
            } else if required {
                return Err(StepError::Validation(format!(
                    "required file '{}' not found: {}",
                    entry.key,
                    entry.path.display()
                )));
            } else {
                warn!("Optional file '{}' not found, skipping: {}", entry.key, entry.path.display());
            }
        }
        Ok(resolved)
    }

    async fn load(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
        let started = Instant::now();
        let entries = self.resolve_entries().await?;
        let primary_key = self.strategy.primary_key().to_string();

        let fetched = self.pool.fetch_all(self.reader.clone(), entries).await;

        let mut primary = None;
        let mut auxiliary = Vec::new();
        for (entry, outcome) in fetched {
            if entry.key == primary_key {
                primary = Some((entry, outcome?));
                continue;
            }
            match outcome {
                Ok(frame) if frame.height() > 0 => auxiliary.push((entry.key, frame)),
                Ok(_) => debug!("Auxiliary '{}' is empty, ignoring", entry.key),
                Err(e) => {
                    warn!("Auxiliary '{}' unavailable: {}", entry.key, e);
                    context.add_warning(format!("auxiliary '{}' unavailable: {}", entry.key, e));
                }
            }
        }

        let (primary_entry, raw) = primary
            .ok_or_else(|| StepError::Validation(format!("no '{}' entry supplied", primary_key)))?;

        let frame = normalize_common_columns(trim_headers(raw)?)?;
        let frame = self.strategy.interpret_primary(frame)?;
        self.strategy.validate(&frame)?;

        let (date, month) = derive_processing_date(context.processing_date(), &primary_entry.path);
        let rows = frame.height();
        let auxiliary_count = auxiliary.len();

        context.update_data(frame);
        for (key, frame) in auxiliary {
            context.add_auxiliary_data(key, frame);
        }
        context.metadata.processing_date = Some(date);
        context.set_variable("processing_date", date);
        context.set_variable("processing_month", month);
        context.set_variable("file_paths", self.file_paths.keys().cloned().collect::<Vec<_>>());

        let references = match self.strategy.load_reference(context, self.reader.as_ref(), &self.profile).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Reference data unavailable: {}", e);
                context.add_warning(format!("reference data unavailable: {}", e));
                0
            }
        };

        info!(
            "Loaded {} rows, {} auxiliary and {} reference datasets in {:.2}s",
            rows,
            auxiliary_count,
            references,
            started.elapsed().as_secs_f64()
        );

        Ok(StepResult::success(&self.name, format!("Loaded {} rows", rows))
            .with_metadata("rows", rows)
            .with_metadata("auxiliary_datasets", auxiliary_count)
            .with_metadata("reference_datasets", references)
            .with_metadata("processing_date", date))
    }
}

#[async_trait]
impl<S: LoadingStrategy> PipelineStep for LoadingStep<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &StepOptions {
        &self.options
    }

    async fn validate_input(&self, _context: &ProcessingContext) -> bool {
        if !self.file_paths.contains_key(self.strategy.primary_key()) {
            warn!("{}: missing '{}' file entry", self.name, self.strategy.primary_key());
            return false;
        }
        true
    }

    async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
        let outcome = self.load(context).await;
        if let Err(e) = self.reader.close().await {
            warn!("Failed to release reader: {}", e);
        }
        outcome
    }

    async fn rollback(&self, _context: &mut ProcessingContext, error: &StepError) {
        warn!("Rolling back {}: {}", self.name, error);
        if let Err(e) = self.reader.close().await {
            warn!("Failed to release reader: {}", e);
        }
    }
}

/// Processing date as (YYYYMM, month)
///
/// An explicit date wins, then six digits in the file name, then today.
pub fn derive_processing_date(explicit: Option<u32>, primary: &Path) -> (u32, u32) {
    if let Some(date) = explicit {
        return (date, date % 100);
    }

    let stem = primary.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let from_name = Regex::new(r"(\d{6})")
        .ok()
        .and_then(|re| re.captures(&stem).map(|c| c[1].to_string()))
        .and_then(|digits| digits.parse::<u32>().ok())
        .filter(|date| (1..=12).contains(&(date % 100)));
    if let Some(date) = from_name {
        return (date, date % 100);
    }

    let today = Local::now();
    let date = today.year() as u32 * 100 + today.month();
    warn!("Could not extract date from {}, using current month {}", primary.display(), date);
    (date, today.month())
}

fn trim_headers(mut frame: DataFrame) -> Result<DataFrame, StepError> {
    let trimmed: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    frame.set_column_names(trimmed)?;
    Ok(frame)
}

fn integer_text(value: &str) -> Option<String> {
    parse_number(value).map(|n| format!("{}", n.round() as i64))
}

/// Line numbers as integer text, GL accounts with a placeholder for missing values
fn normalize_common_columns(mut frame: DataFrame) -> Result<DataFrame, StepError> {
    if let Some(lines) = text_column(&frame, LINE_NUMBER)? {
        let lines = lines
            .into_iter()
            .map(|v| v.map(|s| integer_text(&s).unwrap_or(s)))
            .collect();
        set_text_column(&mut frame, LINE_NUMBER, lines)?;
    }

    if let Some(accounts) = text_column(&frame, GL_ACCOUNT)? {
        let accounts = accounts
            .into_iter()
            .map(|v| match v {
                Some(s) if !is_blank(Some(s.as_str())) && s.trim() != "N.A." => Some(integer_text(&s).unwrap_or(s)),
                _ => Some(PLACEHOLDER_GL.to_string()),
            })
            .collect();
        set_text_column(&mut frame, GL_ACCOUNT, accounts)?;
    }

    Ok(frame)
}

/// `{document}-{line}` key column
fn add_line_key(frame: &mut DataFrame, id_column: &str, key_column: &str) -> Result<(), StepError> {
    let ids = text_column(frame, id_column)?.unwrap_or_default();
    let lines = text_column(frame, LINE_NUMBER)?.unwrap_or_default();
    let keys = ids
        .into_iter()
        .zip(lines)
        .map(|(id, line)| Some(format!("{}-{}", id.unwrap_or_default(), line.unwrap_or_default())))
        .collect();
    set_text_column(frame, key_column, keys)?;
    Ok(())
}

fn require_columns(frame: &DataFrame, required: &[&str]) -> Result<(), StepError> {
    let missing = missing_columns(frame, required);
    if !missing.is_empty() {
        return Err(StepError::Validation(format!(
            "primary data is missing columns: {}",
            missing.join(", ")
        )));
    }
    if frame.height() == 0 {
        return Err(StepError::Validation("primary data has no rows".to_string()));
    }
    Ok(())
}

/// Read the entity account mapping into `reference_account` and `reference_liability`
pub async fn load_account_mapping(
    context: &mut ProcessingContext,
    reader: &dyn ResourceReader,
    profile: &EntityProfile,
) -> Result<usize, StepError> {
    if context.has_auxiliary_data(REFERENCE_ACCOUNT) && context.has_auxiliary_data(REFERENCE_LIABILITY) {
        debug!("Reference data already supplied");
        return Ok(0);
    }

    let Some(path) = &profile.reference_mapping else {
        warn!("No account mapping configured for {}", context.entity_type());
        return Ok(0);
    };
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!("Account mapping file not found: {}", path.display());
        return Ok(0);
    }

    let mapping = reader.read(path, &ReadParams::new()).await?;
    let mapping = trim_headers(mapping)?;
    let mut added = 0;
    if !context.has_auxiliary_data(REFERENCE_ACCOUNT) {
        context.add_auxiliary_data(REFERENCE_ACCOUNT, mapping.select([REF_ACCOUNT, REF_ACCOUNT_DESC])?);
        added += 1;
    }
    if !context.has_auxiliary_data(REFERENCE_LIABILITY) {
        context.add_auxiliary_data(REFERENCE_LIABILITY, mapping.select([REF_ACCOUNT, "Liability"])?);
        added += 1;
    }
    info!("Loaded account mapping: {} records", mapping.height());
    Ok(added)
}

/// Purchase-order source
#[derive(Debug, Default, Clone, Copy)]
pub struct PurchaseOrderLoading;

impl LoadingStrategy for PurchaseOrderLoading {
    fn primary_key(&self) -> &str {
        "raw_po"
    }

    fn interpret_primary(&self, mut frame: DataFrame) -> Result<DataFrame, StepError> {
        if frame.height() > 0 {
            require_columns(&frame, &["PO#", LINE_NUMBER])?;
            add_line_key(&mut frame, "PO#", PO_LINE)?;
        }
        Ok(frame)
    }

    fn validate(&self, frame: &DataFrame) -> Result<(), StepError> {
        require_columns(frame, &["PO#", LINE_NUMBER, PO_LINE])
    }
}

/// Purchase-request source
#[derive(Debug, Default, Clone, Copy)]
pub struct PurchaseRequestLoading;

impl LoadingStrategy for PurchaseRequestLoading {
    fn primary_key(&self) -> &str {
        "raw_pr"
    }

    fn interpret_primary(&self, mut frame: DataFrame) -> Result<DataFrame, StepError> {
        if frame.height() > 0 {
            require_columns(&frame, &["PR#", LINE_NUMBER])?;
            add_line_key(&mut frame, "PR#", PR_LINE)?;
        }
        Ok(frame)
    }

    fn validate(&self, frame: &DataFrame) -> Result<(), StepError> {
        require_columns(frame, &["PR#", LINE_NUMBER, PR_LINE])
    }
}
