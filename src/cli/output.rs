//! CLI output formatting

use crate::{
    core::{ExecutionStatus, StepStatus},
    execution::ExecutionEvent,
    persistence::{CheckpointListing, RunSummary},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub use console::style;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static DISK: Emoji<'_, '_> = Emoji("💾 ", "* ");

/// Progress bar with one tick per step
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Success => style(status).green().to_string(),
        StepStatus::Failed => style(status).red().to_string(),
        StepStatus::Skipped => style(status).dim().to_string(),
        _ => style(status).yellow().to_string(),
    }
}

/// One-line summary of a stored run
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };
    let date = summary
        .processing_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} {} - {} {} - {} - {} ({}/{} ok) - {}",
        status_icon,
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        style(date).cyan(),
        format_status(summary.status),
        style(summary.started_at.format("%Y-%m-%d %H:%M")).dim(),
        summary.succeeded,
        summary.total_steps,
        format_duration(Duration::from_secs_f64(summary.duration_secs().max(0.0)))
    )
}

pub fn format_checkpoint(listing: &CheckpointListing) -> String {
    match &listing.metadata {
        Some(metadata) => format!(
            "{} {} - after {} - {} rows, {} auxiliary - {}",
            DISK,
            style(&listing.id).bold(),
            style(&metadata.step_name).cyan(),
            metadata.data.rows,
            metadata.auxiliary.len(),
            style(metadata.created_at.format("%Y-%m-%d %H:%M:%S")).dim()
        ),
        None => format!("{} {} - {}", WARN, style(&listing.id).bold(), style("unreadable metadata").red()),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting {} ({} steps)",
            ROCKET,
            style(pipeline_name).bold(),
            total_steps
        ),
        ExecutionEvent::StepStarted { step_name, index, total } => {
            format!("{} [{}/{}] {}", SPINNER, index + 1, total, style(step_name).cyan())
        }
        ExecutionEvent::StepFinished {
            step_name,
            index,
            total,
            status,
            message,
            duration_secs,
        } => {
            let icon = match status {
                StepStatus::Success => CHECK,
                StepStatus::Failed => CROSS,
                _ => INFO,
            };
            format!(
                "{} [{}/{}] {} {} {} ({:.2}s)",
                icon,
                index + 1,
                total,
                style(step_name).bold(),
                format_step_status(*status),
                style(message).dim(),
                duration_secs
            )
        }
        ExecutionEvent::CheckpointSaved {
            step_name,
            checkpoint_id,
        } => format!(
            "{} Checkpoint after {}: {}",
            DISK,
            style(step_name).dim(),
            style(checkpoint_id).cyan()
        ),
        ExecutionEvent::CheckpointFailed { step_name, error } => format!(
            "{} Checkpoint after {} failed: {}",
            WARN,
            style(step_name).yellow(),
            style(error).dim()
        ),
        ExecutionEvent::PipelineCompleted {
            execution_id,
            pipeline_name,
            status,
            succeeded,
            failed,
            skipped,
        } => format!(
            "{} {} ({}) {} - {} succeeded, {} failed, {} skipped",
            INFO,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status),
            style(succeeded).green(),
            style(failed).red(),
            style(skipped).dim()
        ),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
