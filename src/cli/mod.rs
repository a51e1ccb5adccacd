//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::AppConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{CheckpointsCommand, HistoryCommand, RunCommand, StepsCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration file looked up in the working directory
pub const LOCAL_CONFIG: &str = "accrual.yaml";

/// Monthly PO/PR accrual reconciliation
#[derive(Debug, Parser, Clone)]
#[command(name = "accrual")]
#[command(version)]
#[command(about = "Monthly PO/PR accrual reconciliation pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the pipeline for an entity
    Run(RunCommand),

    /// Show the steps a pipeline would run
    Steps(StepsCommand),

    /// Validate a configuration file
    Validate(ValidateCommand),

    /// List or delete checkpoints
    Checkpoints(CheckpointsCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

/// Candidate configuration paths in lookup order
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("accrual-pipeline").join("config.yaml"));
    }
    candidates
}

/// Load configuration from the first existing candidate, else built-in defaults
///
/// An explicit path must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = AppConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }

    for candidate in config_candidates(None) {
        if candidate.is_file() {
            info!("Using configuration {}", candidate.display());
            let config = AppConfig::from_file(&candidate)
                .with_context(|| format!("Failed to load configuration {}", candidate.display()))?;
            return Ok((config, Some(candidate)));
        }
        debug!("No configuration at {}", candidate.display());
    }

    Ok((AppConfig::default(), None))
}
