//! Test: required/optional failures with and without stop_on_error

use crate::helpers::*;
use accrual_pipeline::core::{ErrorKind, ExecutionStatus, PipelineStep, StepOptions, StepStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn chain(fail_at: usize, len: usize) -> Vec<Arc<dyn PipelineStep>> {
    (0..len)
        .map(|i| {
            let behavior = if i == fail_at { Behavior::AlwaysLookup } else { Behavior::Succeed };
            Arc::new(MockStep::new(&format!("step{}", i + 1), behavior)) as Arc<dyn PipelineStep>
        })
        .collect()
}

/// Failing step k (1-based) leaves exactly k results
#[tokio::test]
async fn test_stop_on_error_truncates_results() {
    for fail_at in 0..4 {
        let pipeline = pipeline(chain(fail_at, 4), true);
        let mut ctx = context();

        let run = pipeline.execute(&mut ctx).await;

        assert_eq!(run.results.len(), fail_at + 1);
        assert_eq!(run.results.last().unwrap().status, StepStatus::Failed);
        assert_eq!(run.status, ExecutionStatus::Failed);
        assert!(run.aborted);
        assert!(ctx.get_variable(&format!("ran_step{}", fail_at + 2)).is_none());
    }
}

#[tokio::test]
async fn test_continue_on_error_returns_every_result() {
    for fail_at in 0..4 {
        let pipeline = pipeline(chain(fail_at, 4), false);
        let mut ctx = context();

        let run = pipeline.execute(&mut ctx).await;

        assert_eq!(run.results.len(), 4);
        assert_eq!(run.failed(), 1);
        assert_eq!(run.succeeded(), 3);
        assert_eq!(run.status, ExecutionStatus::Failed);
        assert!(!run.aborted);
    }
}

#[tokio::test]
async fn test_optional_failure_does_not_fail_pipeline() {
    let optional = MockStep::new("summary", Behavior::AlwaysLookup).with_options(StepOptions::optional());
    let rollbacks = optional.rollbacks.clone();
    let pipeline = pipeline(
        vec![
            Arc::new(MockStep::new("load", Behavior::Succeed)),
            Arc::new(optional),
            Arc::new(MockStep::new("export", Behavior::Succeed)),
        ],
        true,
    );
    let mut ctx = context();

    let run = pipeline.execute(&mut ctx).await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.results.len(), 3);
    assert_eq!(run.results[1].status, StepStatus::Failed);
    assert_eq!(run.results[1].error_kind, Some(ErrorKind::Lookup));
    assert_eq!(rollbacks.load(Ordering::SeqCst), 0);
    // Only successes reach the history
    assert_eq!(ctx.history().len(), 2);
}

#[tokio::test]
async fn test_required_failure_rolls_back_once() {
    let failing = MockStep::new("evaluate", Behavior::AlwaysTransient)
        .with_options(StepOptions::default().with_retries(2));
    let rollbacks = failing.rollbacks.clone();
    let pipeline = pipeline(vec![Arc::new(failing)], true);
    let mut ctx = context();

    let run = pipeline.execute(&mut ctx).await;

    assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(run.results[0].error_kind, Some(ErrorKind::TransientIo));
    assert!(run.results[0].message.contains("connection reset"));
}
