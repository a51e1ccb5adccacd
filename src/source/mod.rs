//! External resource readers and the file-path input model

pub mod csv;
pub mod pool;

pub use csv::CsvReader;
pub use pool::FetchPool;

use crate::core::StepError;
use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Opaque reader parameters
pub type ReadParams = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl From<SourceError> for StepError {
    /// Missing and unreadable files may recover on a later attempt; malformed content will not
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(_) | SourceError::Io { .. } => StepError::TransientIo(err.to_string()),
            SourceError::Parse { .. } => StepError::Validation(err.to_string()),
        }
    }
}

/// Pluggable reader turning a path into a dataset
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, path: &Path, params: &ReadParams) -> Result<DataFrame, SourceError>;

    /// Release any held handles
    async fn close(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// One file-key entry as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSpec {
    Path(String),
    Entry {
        path: String,
        #[serde(default)]
        params: ReadParams,
        #[serde(default)]
        required: Option<bool>,
    },
}

impl From<&str> for FileSpec {
    fn from(path: &str) -> Self {
        FileSpec::Path(path.to_string())
    }
}

/// Logical key -> file entry
pub type FilePaths = BTreeMap<String, FileSpec>;

/// Normalized file entry
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub key: String,
    pub path: PathBuf,
    pub params: ReadParams,
    /// Explicit required flag; `None` lets the loading step decide
    pub required: Option<bool>,
}

impl FileSpec {
    pub fn normalize(&self, key: &str) -> FileEntry {
        match self {
            FileSpec::Path(path) => FileEntry {
                key: key.to_string(),
                path: PathBuf::from(path),
                params: ReadParams::new(),
                required: None,
            },
            FileSpec::Entry { path, params, required } => FileEntry {
                key: key.to_string(),
                path: PathBuf::from(path),
                params: params.clone(),
                required: *required,
            },
        }
    }
}

/// Normalize every entry, keeping key order
pub fn normalize_paths(paths: &FilePaths) -> Vec<FileEntry> {
    paths.iter().map(|(key, spec)| spec.normalize(key)).collect()
}
