//! CLI command definitions

use crate::core::ProcessingType;
use crate::source::{FilePaths, FileSpec};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Run the accrual pipeline for one entity
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Entity code, e.g. SPT
    #[arg(short, long)]
    pub entity: String,

    /// Processing type
    #[arg(short = 't', long = "type", value_enum)]
    pub processing_type: ProcessingTypeArg,

    /// Input files as key=path (raw_po, raw_pr, previous, procurement_po, ...)
    #[arg(short, long = "file", value_parser = parse_key_value)]
    pub files: Vec<(String, String)>,

    /// Processing month as YYYYMM
    #[arg(short, long, value_parser = parse_yyyymm)]
    pub date: Option<u32>,

    /// Don't save checkpoints, even when enabled in configuration
    #[arg(long)]
    pub no_checkpoint: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Continue after the step recorded in this checkpoint
    #[arg(long)]
    pub resume: Option<String>,
}

impl RunCommand {
    pub fn file_paths(&self) -> FilePaths {
        self.files
            .iter()
            .map(|(key, path)| (key.clone(), FileSpec::from(path.as_str())))
            .collect()
    }
}

/// Show the steps a pipeline would run
#[derive(Debug, Args, Clone)]
pub struct StepsCommand {
    /// Entity code; without it every known step is listed
    #[arg(short, long)]
    pub entity: Option<String>,

    #[arg(short = 't', long = "type", value_enum, default_value_t = ProcessingTypeArg::Po)]
    pub processing_type: ProcessingTypeArg,
}

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Configuration to validate; defaults to the lookup order used by `run`
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Print the effective configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// Manage saved checkpoints
#[derive(Debug, Args, Clone)]
pub struct CheckpointsCommand {
    /// Checkpoint root; defaults to `checkpoint.dir` from configuration
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub action: CheckpointAction,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CheckpointAction {
    /// List checkpoints
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete a checkpoint
    Delete {
        /// Checkpoint id
        id: String,
    },
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Entity to filter by
    #[arg(short, long)]
    pub entity: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Processing type argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProcessingTypeArg {
    #[value(alias = "PO")]
    Po,
    #[value(alias = "PR")]
    Pr,
}

impl From<ProcessingTypeArg> for ProcessingType {
    fn from(arg: ProcessingTypeArg) -> Self {
        match arg {
            ProcessingTypeArg::Po => ProcessingType::Po,
            ProcessingTypeArg::Pr => ProcessingType::Pr,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("Invalid key=path pair: {}", s)),
    }
}

/// Parse a YYYYMM month
pub fn parse_yyyymm(s: &str) -> Result<u32, String> {
    let value: u32 = s.parse().map_err(|_| format!("Invalid YYYYMM: {}", s))?;
    let (year, month) = (value / 100, value % 100);
    if s.len() != 6 || !(1900..=9999).contains(&year) || !(1..=12).contains(&month) {
        return Err(format!("Invalid YYYYMM: {}", s));
    }
    Ok(value)
}
