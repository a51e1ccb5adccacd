use accrual_pipeline::cli::commands::{
    CheckpointAction, CheckpointsCommand, HistoryCommand, RunCommand, StepsCommand, ValidateCommand,
};
use accrual_pipeline::cli::output::*;
use accrual_pipeline::cli::{load_config, Cli, Command};
use accrual_pipeline::core::{AppConfig, ProcessingContext, ProcessingType};
use accrual_pipeline::execution::{ExecutionEngine, ExecutionEvent};
use accrual_pipeline::orchestrator::{PipelineOrchestrator, StepKind};
use accrual_pipeline::persistence::{
    create_summary, CheckpointManager, RunHistoryStore, RunSummary,
};
use accrual_pipeline::source::{CsvReader, FetchPool, FilePaths};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Steps(cmd) => show_steps(cmd, &cli)?,
        Command::Validate(cmd) => validate_config(cmd, &cli)?,
        Command::Checkpoints(cmd) => manage_checkpoints(cmd, &cli)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn open_history() -> Result<Box<dyn RunHistoryStore>> {
    #[cfg(feature = "sqlite")]
    {
        let store = accrual_pipeline::persistence::SqliteRunStore::with_default_path().await?;
        Ok(Box::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Ok(Box::new(accrual_pipeline::persistence::InMemoryRunStore::new()))
    }
}

fn orchestrator(config: AppConfig) -> PipelineOrchestrator {
    let pool = FetchPool::new(config.defaults.max_concurrent_reads);
    PipelineOrchestrator::new(Arc::new(config), Arc::new(CsvReader::new()), pool)
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let (config, source) = load_config(cli.config.as_deref())?;
    if let Some(path) = &source {
        println!("{} Configuration: {}", INFO, style(path.display()).dim());
    }

    let processing_type = ProcessingType::from(cmd.processing_type);
    let checkpoint_dir = config.checkpoint.dir.clone();
    let checkpoints_enabled = config.checkpoint.enabled && !cmd.no_checkpoint;
    let orchestrator = orchestrator(config);

    let pipeline = orchestrator
        .build(&cmd.entity, processing_type, &cmd.file_paths(), Vec::new())
        .context("Failed to build pipeline")?;

    let (pipeline, mut context) = match &cmd.resume {
        Some(id) => {
            let manager = CheckpointManager::new(&checkpoint_dir);
            let metadata = manager.load_metadata(id)?;
            let context = manager.load(id)?;
            if !context.entity_type().eq_ignore_ascii_case(&cmd.entity) || context.processing_type() != processing_type {
                bail!(
                    "Checkpoint {} belongs to {}/{}, not {}/{}",
                    id,
                    context.entity_type(),
                    context.processing_type(),
                    cmd.entity,
                    processing_type
                );
            }
            let remaining = pipeline
                .resume_after(&metadata.step_name)
                .ok_or_else(|| anyhow!("Step {} is not part of {}", metadata.step_name, pipeline.name()))?;
            println!(
                "{} Resuming after {} ({} steps left)",
                INFO,
                style(&metadata.step_name).cyan(),
                remaining.len()
            );
            (remaining, context)
        }
        None => {
            let mut context = ProcessingContext::new(cmd.entity.to_uppercase(), processing_type);
            if let Some(date) = cmd.date {
                context = context.with_processing_date(date);
            }
            (pipeline, context)
        }
    };

    let mut engine = ExecutionEngine::new();
    if checkpoints_enabled {
        engine = engine.with_checkpoints(Arc::new(CheckpointManager::new(checkpoint_dir)));
    }

    let progress = create_progress_bar(pipeline.len());
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        match &event {
            ExecutionEvent::StepStarted { step_name, .. } => bar.set_message(step_name.clone()),
            ExecutionEvent::StepFinished { .. } => bar.inc(1),
            _ => {}
        }
        bar.println(format_execution_event(&event));
    });

    let run = engine.execute(&pipeline, &mut context).await;
    progress.finish_and_clear();

    for warning in context.warnings() {
        println!("{} {}", WARN, style(warning).yellow());
    }

    let summary = create_summary(&run, &context);
    if !cmd.no_history {
        let store = open_history().await?;
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }

    if let Some(path) = context.get_variable("export_path").and_then(|v| v.as_str()) {
        println!("{} Output: {}", CHECK, style(path).bold());
    }

    if run.is_success() {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(pipeline.name()).bold(),
            style("successfully").green()
        );
        Ok(())
    } else {
        println!("\n{} {} {}", CROSS, style(pipeline.name()).bold(), style("failed").red());
        if let Some(result) = run.results.iter().find(|r| r.is_failed()) {
            error!("{}: {}", result.step_name, result.message);
        }
        std::process::exit(1);
    }
}

fn show_steps(cmd: &StepsCommand, cli: &Cli) -> Result<()> {
    let Some(entity) = &cmd.entity else {
        println!("{} Available steps:", INFO);
        for kind in StepKind::ALL {
            println!("  {} - {}", style(kind.name()).bold(), style(kind.description()).dim());
        }
        return Ok(());
    };

    let (config, _) = load_config(cli.config.as_deref())?;
    let processing_type = ProcessingType::from(cmd.processing_type);
    let orchestrator = orchestrator(config);

    println!(
        "{} Steps for {}/{}:",
        INFO,
        style(entity.to_uppercase()).bold(),
        processing_type
    );
    for (index, name) in orchestrator.enabled_steps(entity, processing_type).iter().enumerate() {
        match StepKind::from_name(name) {
            Some(kind) => println!("  {}. {} - {}", index + 1, style(name).cyan(), style(kind.description()).dim()),
            None => println!("  {}. {} {}", index + 1, style(name).yellow(), style("(unknown, skipped)").dim()),
        }
    }
    Ok(())
}

fn validate_config(cmd: &ValidateCommand, cli: &Cli) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    let explicit = cmd.file.as_deref().or(cli.config.as_deref());
    let (config, source) = match load_config(explicit) {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    // Building every configured pipeline catches unknown condition names
    let json = if cmd.json { Some(serde_json::to_string_pretty(&config)?) } else { None };
    let entities: BTreeSet<String> = config.pipelines.keys().chain(config.entities.keys()).cloned().collect();
    let orchestrator = orchestrator(config);
    let mut failures = 0;
    for entity in &entities {
        for processing_type in [ProcessingType::Po, ProcessingType::Pr] {
            if let Err(e) = orchestrator.build(entity, processing_type, &FilePaths::new(), Vec::new()) {
                failures += 1;
                println!("{} {}/{}: {}", CROSS, entity, processing_type, style(e).red());
            }
        }
    }
    if failures > 0 {
        std::process::exit(1);
    }

    let config = orchestrator.config();
    println!("{} Configuration is valid!", CHECK);
    match source {
        Some(path) => println!("  Source: {}", style(path.display()).dim()),
        None => println!("  Source: {}", style("built-in defaults").dim()),
    }
    println!("  Pipelines: {}", style(config.pipelines.len()).cyan());
    println!("  Entities: {}", style(config.entities.len()).cyan());
    println!("  Rule sets: {}", style(config.rules.len()).cyan());
    println!("  Checkpoints: {}", if config.checkpoint.enabled { "enabled" } else { "disabled" });

    if let Some(json) = json {
        println!("\n{}", json);
    }
    Ok(())
}

fn manage_checkpoints(cmd: &CheckpointsCommand, cli: &Cli) -> Result<()> {
    let dir: PathBuf = match &cmd.dir {
        Some(dir) => dir.clone(),
        None => load_config(cli.config.as_deref())?.0.checkpoint.dir,
    };
    let manager = CheckpointManager::new(dir);

    match &cmd.action {
        CheckpointAction::List { json } => {
            let listings = manager.list()?;
            if listings.is_empty() {
                println!("{} No checkpoints in {}", INFO, manager.root().display());
                return Ok(());
            }
            if *json {
                let data: Vec<_> = listings
                    .iter()
                    .map(|l| serde_json::json!({ "id": l.id, "metadata": l.metadata }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{} Checkpoints in {}:", INFO, manager.root().display());
                for listing in &listings {
                    println!("  {}", format_checkpoint(listing));
                }
            }
        }
        CheckpointAction::Delete { id } => {
            if manager.delete(id)? {
                println!("{} Deleted {}", CHECK, style(id).bold());
            } else {
                println!("{} Checkpoint {} not found", WARN, style(id).bold());
            }
        }
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history().await?;

    if let Some(id) = &cmd.execution_id {
        let execution_id = uuid::Uuid::parse_str(id).context("Invalid execution ID format")?;
        match store.load_run(execution_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs: Vec<RunSummary> = store
        .list_runs(cmd.entity.as_deref())
        .await?
        .into_iter()
        .take(cmd.limit)
        .collect();

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, runs.len());
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }
    Ok(())
}

fn print_run_details(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Entity: {} {}", summary.entity_type, summary.processing_type);
    if let Some(date) = summary.processing_date {
        println!("  Month: {}", date);
    }
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    println!("  Completed: {}", style(summary.completed_at.to_rfc3339()).dim());
    println!(
        "  Steps: {} total, {} succeeded, {} failed, {} skipped",
        summary.total_steps,
        style(summary.succeeded).green(),
        style(summary.failed).red(),
        style(summary.skipped).dim()
    );
    if let Some(step) = &summary.failed_step {
        println!("  First failure: {}", style(step).red());
    }
    Ok(())
}
