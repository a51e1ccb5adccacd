//! CSV reader backed by polars

use super::{ReadParams, ResourceReader, SourceError};
use async_trait::async_trait;
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Reads delimited text files with every column kept as text
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReader;

impl CsvReader {
    pub fn new() -> Self {
        Self
    }
}

struct CsvParams {
    separator: u8,
    skip_rows: usize,
    has_header: bool,
}

impl CsvParams {
    fn from_params(path: &Path, params: &ReadParams) -> Result<Self, SourceError> {
        let separator = match params.get("separator").and_then(|v| v.as_str()) {
            None => b',',
            Some(s) if s.len() == 1 => s.as_bytes()[0],
            Some(s) => {
                return Err(SourceError::Parse {
                    path: path.to_path_buf(),
                    message: format!("separator must be a single byte, got '{}'", s),
                })
            }
        };
        let skip_rows = params.get("skip_rows").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let has_header = params.get("has_header").and_then(|v| v.as_bool()).unwrap_or(true);

        Ok(Self {
            separator,
            skip_rows,
            has_header,
        })
    }
}

fn read_blocking(path: PathBuf, params: CsvParams) -> Result<DataFrame, SourceError> {
    let parse_error = |e: PolarsError| SourceError::Parse {
        path: path.clone(),
        message: e.to_string(),
    };

    let separator = params.separator;
    CsvReadOptions::default()
        .with_has_header(params.has_header)
        .with_skip_rows(params.skip_rows)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.clone()))
        .map_err(parse_error)?
        .finish()
        .map_err(parse_error)
}

#[async_trait]
impl ResourceReader for CsvReader {
    async fn read(&self, path: &Path, params: &ReadParams) -> Result<DataFrame, SourceError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(SourceError::NotFound(path.to_path_buf()));
        }

        let csv = CsvParams::from_params(path, params)?;
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_blocking(owned, csv))
            .await
            .map_err(|e| SourceError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
    }
}
