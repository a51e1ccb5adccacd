//! Step executor - the validation/retry/timeout wrapper shared by every step

use crate::core::{PipelineStep, ProcessingContext, StepError, StepResult};
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// Runs a single step under its options
#[derive(Debug, Default, Clone, Copy)]
pub struct StepExecutor;

impl StepExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a step and return its result
    ///
    /// Successful results are appended to the context history.
    pub async fn run(&self, step: &dyn PipelineStep, context: &mut ProcessingContext) -> StepResult {
        let started = Instant::now();
        let options = step.options();

        if !step.validate_input(context).await {
            if !options.required {
                warn!("Skipping step {}: input validation failed", step.name());
                let mut result = StepResult::skipped(step.name(), "Input validation failed");
                result.duration_secs = started.elapsed().as_secs_f64();
                return result;
            }
            error!("Required step {} failed input validation", step.name());
            let error = StepError::Validation("input validation failed".to_string());
            let mut result = StepResult::failed(step.name(), &error);
            result.duration_secs = started.elapsed().as_secs_f64();
            return result;
        }

        let max_attempts = options.retry_count + 1;
        let mut attempt = 0;

        let error = loop {
            attempt += 1;
            info!("Executing step {} (attempt {}/{})", step.name(), attempt, max_attempts);

            let outcome = match options.timeout {
                Some(limit) => match timeout(limit, step.execute(context)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StepError::Timeout(limit)),
                },
                None => step.execute(context).await,
            };

            match outcome {
                Ok(mut result) => {
                    result.attempts = attempt;
                    result.duration_secs = started.elapsed().as_secs_f64();
                    info!("Step {} completed: {}", step.name(), result.message);
                    context.record_result(result.clone());
                    return result;
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = options.backoff_for(attempt - 1);
                    warn!(
                        "Step {} attempt {} failed: {}; retrying in {:?}",
                        step.name(),
                        attempt,
                        err,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(err) => break err,
            }
        };

        error!("Step {} failed after {} attempt(s): {}", step.name(), attempt, error);
        if options.required {
            step.rollback(context, &error).await;
        }

        let mut result = StepResult::failed(step.name(), &error);
        result.attempts = attempt;
        result.duration_secs = started.elapsed().as_secs_f64();
        result
    }
}
