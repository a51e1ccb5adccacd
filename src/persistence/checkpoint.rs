//! Context snapshots taken at step boundaries
//!
//! Each checkpoint is a directory holding one parquet file per dataset and a
//! `metadata.json` written last. The metadata records every artifact's digest
//! and shape; a checkpoint whose artifacts do not match is reported as corrupt.

use crate::core::{ContextMetadata, ErrorKind, ProcessingContext, ProcessingType, StepError, StepResult};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const METADATA_FILE: &str = "metadata.json";
pub const DATA_FILE: &str = "data.parquet";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint {0} not found")]
    NotFound(String),

    #[error("invalid checkpoint id '{0}'")]
    InvalidId(String),

    #[error("checkpoint {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint data error: {0}")]
    Data(#[from] PolarsError),

    #[error("checkpoint metadata error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    fn corrupt(id: &str, reason: impl Into<String>) -> Self {
        CheckpointError::Corrupt {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckpointError::Corrupt { .. } => ErrorKind::CorruptCheckpoint,
            CheckpointError::NotFound(_) | CheckpointError::InvalidId(_) => ErrorKind::Validation,
            CheckpointError::Io(_) => ErrorKind::TransientIo,
            CheckpointError::Data(_) | CheckpointError::Serialization(_) => ErrorKind::Data,
        }
    }
}

impl From<CheckpointError> for StepError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Corrupt { id, reason } => StepError::CorruptCheckpoint { id, reason },
            CheckpointError::Io(e) => StepError::TransientIo(e.to_string()),
            CheckpointError::Data(e) => StepError::Data(e),
            other => StepError::Validation(other.to_string()),
        }
    }
}

/// One stored dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    /// File name inside the checkpoint; `None` for a frame without columns
    pub file: Option<String>,
    pub rows: usize,
    pub columns: usize,
    pub sha256: Option<String>,
}

/// Self-describing record written alongside the datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub checkpoint_id: String,
    pub entity_type: String,
    pub processing_type: ProcessingType,
    pub processing_date: Option<u32>,
    pub step_name: String,
    pub created_at: DateTime<Utc>,
    pub data: ArtifactInfo,
    pub auxiliary: BTreeMap<String, ArtifactInfo>,
    pub variables: BTreeMap<String, Value>,
    pub history: Vec<StepResult>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn auxiliary_names(&self) -> Vec<&str> {
        self.auxiliary.keys().map(String::as_str).collect()
    }
}

/// Entry returned by [`CheckpointManager::list`]
#[derive(Debug, Clone)]
pub struct CheckpointListing {
    pub id: String,
    /// `None` when the metadata is missing or unreadable
    pub metadata: Option<CheckpointMetadata>,
}

/// Saves and restores processing contexts under a root directory
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    root: PathBuf,
}

impl CheckpointManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic id: `{entity}_{type}_{date}_after_{step}`
    ///
    /// Characters outside `[A-Za-z0-9_-]` become `_`; when that happens an
    /// eight-digit digest of the raw id is appended so distinct names stay distinct.
    pub fn checkpoint_id(context: &ProcessingContext, step_name: &str) -> String {
        let date = context
            .processing_date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());
        let raw = format!(
            "{}_{}_{}_after_{}",
            context.entity_type(),
            context.processing_type(),
            date,
            step_name
        );
        let sanitized: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if sanitized == raw {
            return raw;
        }
        let digest = hex::encode(Sha256::digest(raw.as_bytes()));
        format!("{}-{}", sanitized, &digest[..8])
    }

    /// Snapshot the context after `step_name`, replacing any earlier checkpoint with the same id
    pub fn save(
        &self,
        context: &ProcessingContext,
        step_name: &str,
        extra: BTreeMap<String, Value>,
    ) -> Result<String, CheckpointError> {
        let id = Self::checkpoint_id(context, step_name);
        let dir = self.root.join(&id);
        if dir.exists() {
            debug!("Replacing checkpoint {}", id);
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let data = write_frame(&dir, DATA_FILE, context.data())?;
        let mut auxiliary = BTreeMap::new();
        for (index, (name, frame)) in context.auxiliary_data().enumerate() {
            let file = format!("aux_{:03}.parquet", index);
            auxiliary.insert(name.clone(), write_frame(&dir, &file, frame)?);
        }

        let metadata = CheckpointMetadata {
            checkpoint_id: id.clone(),
            entity_type: context.entity_type().to_string(),
            processing_type: context.processing_type(),
            processing_date: context.processing_date(),
            step_name: step_name.to_string(),
            created_at: Utc::now(),
            data,
            auxiliary,
            variables: context.variables().clone(),
            history: context.history().to_vec(),
            extra,
        };
        fs::write(dir.join(METADATA_FILE), serde_json::to_vec_pretty(&metadata)?)?;

        info!("Saved checkpoint {}", id);
        Ok(id)
    }

    /// Metadata of a stored checkpoint
    pub fn load_metadata(&self, id: &str) -> Result<CheckpointMetadata, CheckpointError> {
        let dir = self.checkpoint_dir(id)?;
        if !dir.is_dir() {
            return Err(CheckpointError::NotFound(id.to_string()));
        }

        let path = dir.join(METADATA_FILE);
        let bytes = fs::read(&path)
            .map_err(|e| CheckpointError::corrupt(id, format!("cannot read {}: {}", METADATA_FILE, e)))?;
        let metadata: CheckpointMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| CheckpointError::corrupt(id, format!("unreadable {}: {}", METADATA_FILE, e)))?;
        if metadata.checkpoint_id != id {
            return Err(CheckpointError::corrupt(
                id,
                format!("metadata belongs to {}", metadata.checkpoint_id),
            ));
        }
        Ok(metadata)
    }

    /// Rebuild the context stored under `id`
    pub fn load(&self, id: &str) -> Result<ProcessingContext, CheckpointError> {
        let metadata = self.load_metadata(id)?;
        let dir = self.root.join(id);

        let data = read_frame(&dir, id, "primary data", &metadata.data)?;
        let mut auxiliary = BTreeMap::new();
        for (name, info) in &metadata.auxiliary {
            auxiliary.insert(name.clone(), read_frame(&dir, id, name, info)?);
        }

        info!("Loaded checkpoint {} (after {})", id, metadata.step_name);
        Ok(ProcessingContext::restore(
            ContextMetadata {
                entity_type: metadata.entity_type,
                processing_type: metadata.processing_type,
                processing_date: metadata.processing_date,
            },
            data,
            auxiliary,
            metadata.variables,
            metadata.history,
        ))
    }

    /// All checkpoint directories under the root, sorted by id
    pub fn list(&self) -> Result<Vec<CheckpointListing>, CheckpointError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut listings = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            let metadata = match self.load_metadata(&id) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            };
            listings.push(CheckpointListing { id, metadata });
        }
        listings.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listings)
    }

    /// Remove a checkpoint; returns false when it did not exist
    pub fn delete(&self, id: &str) -> Result<bool, CheckpointError> {
        let dir = self.checkpoint_dir(id)?;
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        info!("Deleted checkpoint {}", id);
        Ok(true)
    }

    fn checkpoint_dir(&self, id: &str) -> Result<PathBuf, CheckpointError> {
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(CheckpointError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(id))
    }
}

fn write_frame(dir: &Path, file: &str, frame: &DataFrame) -> Result<ArtifactInfo, CheckpointError> {
    let (rows, columns) = frame.shape();
    if columns == 0 {
        return Ok(ArtifactInfo {
            file: None,
            rows,
            columns,
            sha256: None,
        });
    }

    let path = dir.join(file);
    let mut out = File::create(&path)?;
    ParquetWriter::new(&mut out).finish(&mut frame.clone())?;
    drop(out);

    Ok(ArtifactInfo {
        file: Some(file.to_string()),
        rows,
        columns,
        sha256: Some(file_digest(&path)?),
    })
}

fn read_frame(dir: &Path, id: &str, label: &str, info: &ArtifactInfo) -> Result<DataFrame, CheckpointError> {
    let Some(file) = &info.file else {
        return Ok(DataFrame::empty());
    };

    let path = dir.join(file);
    if !path.is_file() {
        return Err(CheckpointError::corrupt(id, format!("missing artifact {} for {}", file, label)));
    }

    let digest = file_digest(&path)?;
    if info.sha256.as_deref() != Some(digest.as_str()) {
        return Err(CheckpointError::corrupt(id, format!("digest mismatch for {}", file)));
    }

    let frame = ParquetReader::new(File::open(&path)?)
        .finish()
        .map_err(|e| CheckpointError::corrupt(id, format!("unreadable {}: {}", file, e)))?;
    if frame.shape() != (info.rows, info.columns) {
        return Err(CheckpointError::corrupt(
            id,
            format!("{} has shape {:?}, expected ({}, {})", file, frame.shape(), info.rows, info.columns),
        ));
    }
    Ok(frame)
}

fn file_digest(path: &Path) -> Result<String, CheckpointError> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
