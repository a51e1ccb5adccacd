//! Test: retry budget, error classes and timeouts

use crate::helpers::*;
use accrual_pipeline::core::{ErrorKind, StepOptions, StepStatus};
use accrual_pipeline::execution::StepExecutor;
use std::time::Duration;

/// retry_count=2 with a permanently transient failure means three attempts
#[tokio::test]
async fn test_transient_failure_uses_whole_budget() {
    let step = MockStep::new("DataLoading", Behavior::AlwaysTransient)
        .with_options(StepOptions::default().with_retries(2));
    let mut ctx = context();

    let result = StepExecutor::new().run(&step, &mut ctx).await;

    assert_eq!(step.attempts(), 3);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::TransientIo));
}

#[tokio::test]
async fn test_recovers_within_budget() {
    let step = MockStep::new("DataLoading", Behavior::FlakyFor(2))
        .with_options(StepOptions::default().with_retries(3));
    let mut ctx = context();

    let result = StepExecutor::new().run(&step, &mut ctx).await;

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(step.attempts(), 3);
    assert_eq!(ctx.history().len(), 1);
    assert_eq!(ctx.history()[0].attempts, 3);
}

#[tokio::test]
async fn test_lookup_error_is_not_retried() {
    let step = MockStep::new("ErmEvaluation", Behavior::AlwaysLookup)
        .with_options(StepOptions::default().with_retries(5));
    let mut ctx = context();

    let result = StepExecutor::new().run(&step, &mut ctx).await;

    assert_eq!(step.attempts(), 1);
    assert_eq!(result.error_kind, Some(ErrorKind::Lookup));
}

#[tokio::test]
async fn test_timed_out_attempts_count_as_failures() {
    let step = MockStep::new("Export", Behavior::Hang).with_options(
        StepOptions::default()
            .with_retries(1)
            .with_timeout(Duration::from_millis(20)),
    );
    let mut ctx = context();

    let result = StepExecutor::new().run(&step, &mut ctx).await;

    assert_eq!(step.attempts(), 2);
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::TransientIo));
    assert!(result.message.contains("timed out"));
    assert!(ctx.get_variable("ran_Export").is_none());
}
