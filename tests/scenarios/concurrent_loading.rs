//! Test: fan-out loading with a degraded auxiliary fetch

use crate::helpers::*;
use accrual_pipeline::core::{ErrorKind, PipelineStep, ProcessingContext, ProcessingType, StepOptions, StepStatus};
use accrual_pipeline::execution::StepExecutor;
use accrual_pipeline::source::{FetchPool, FilePaths, FileSpec};
use accrual_pipeline::steps::{LoadingStep, PurchaseOrderLoading};
use polars::prelude::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn raw_po() -> DataFrame {
    df! {
        "PO#" => &["PO001", "PO002"],
        "Line#" => &["1.0", "2"],
        "GL#" => &["5100", "N.A."],
    }
    .unwrap()
}

fn optional(path: String) -> FileSpec {
    FileSpec::Entry {
        path,
        params: Default::default(),
        required: Some(false),
    }
}

#[tokio::test]
async fn test_one_failed_auxiliary_fetch_degrades_to_absent() {
    let dir = TempDir::new().unwrap();
    let mut paths = FilePaths::new();
    paths.insert("raw_po".into(), FileSpec::from(touch(dir.path(), "202403_purchase_order.csv").as_str()));
    paths.insert("previous".into(), optional(touch(dir.path(), "previous.csv")));
    paths.insert("procurement".into(), optional(touch(dir.path(), "procurement.csv")));

    let reader = Arc::new(
        MockReader::new()
            .serve("202403_purchase_order.csv", raw_po())
            .serve("previous.csv", df! { "PO Line" => &["PO001-1"] }.unwrap())
            .fail("procurement.csv"),
    );
    let step = LoadingStep::new("DataLoading", PurchaseOrderLoading, paths, reader.clone(), FetchPool::new(2));
    let mut ctx = ProcessingContext::new("SPT", ProcessingType::Po);

    let result = StepExecutor::new().run(&step, &mut ctx).await;

    assert_eq!(result.status, StepStatus::Success);
    assert!(ctx.data().height() > 0);
    assert_eq!(ctx.auxiliary_names(), vec!["previous".to_string()]);
    assert_eq!(ctx.warnings().len(), 1);
    assert_eq!(ctx.processing_date(), Some(202403));
    assert_eq!(reader.closes.load(Ordering::SeqCst), 1);

    let keys: Vec<_> = ctx.data().column("PO Line").unwrap().str().unwrap().into_no_null_iter().collect();
    assert_eq!(keys, vec!["PO001-1", "PO002-2"]);
    let gl: Vec<_> = ctx.data().column("GL#").unwrap().str().unwrap().into_no_null_iter().collect();
    assert_eq!(gl, vec!["5100", "666666"]);
}

#[tokio::test]
async fn test_missing_required_file_names_its_key() {
    let dir = TempDir::new().unwrap();
    let mut paths = FilePaths::new();
    paths.insert("raw_po".into(), FileSpec::from(touch(dir.path(), "202403_purchase_order.csv").as_str()));
    paths.insert(
        "closing_list".into(),
        FileSpec::Entry {
            path: dir.path().join("absent.csv").display().to_string(),
            params: Default::default(),
            required: Some(true),
        },
    );

    let reader = Arc::new(MockReader::new().serve("202403_purchase_order.csv", raw_po()));
    let step = LoadingStep::new("DataLoading", PurchaseOrderLoading, paths, reader, FetchPool::new(2));
    let mut ctx = ProcessingContext::new("SPT", ProcessingType::Po);

    let result = StepExecutor::new().run(&step, &mut ctx).await;

    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    assert!(result.message.contains("closing_list"));
    assert_eq!(ctx.data().height(), 0);
    assert!(step.options().required);
}

#[tokio::test]
async fn test_primary_read_failure_fails_step() {
    let dir = TempDir::new().unwrap();
    let mut paths = FilePaths::new();
    paths.insert("raw_po".into(), FileSpec::from(touch(dir.path(), "202403_purchase_order.csv").as_str()));

    let reader = Arc::new(MockReader::new().fail("202403_purchase_order.csv"));
    let step = LoadingStep::new("DataLoading", PurchaseOrderLoading, paths, reader.clone(), FetchPool::new(2));
    let mut ctx = ProcessingContext::new("SPT", ProcessingType::Po);

    let result = StepExecutor::new().run(&step, &mut ctx).await;

    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::TransientIo));
    // Released after the attempt and again by the rollback
    assert_eq!(reader.closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timed_out_attempts_leave_no_reads_behind() {
    let dir = TempDir::new().unwrap();
    let mut paths = FilePaths::new();
    paths.insert("raw_po".into(), FileSpec::from(touch(dir.path(), "202403_purchase_order.csv").as_str()));
    paths.insert("previous".into(), optional(touch(dir.path(), "previous.csv")));

    let reader = Arc::new(
        MockReader::new()
            .serve("202403_purchase_order.csv", raw_po())
            .serve("previous.csv", df! { "PO Line" => &["PO001-1"] }.unwrap())
            .with_delay(Duration::from_millis(300)),
    );
    let step = LoadingStep::new("DataLoading", PurchaseOrderLoading, paths, reader.clone(), FetchPool::new(2)).with_options(
        StepOptions::default()
            .with_retries(1)
            .with_timeout(Duration::from_millis(50))
            .with_backoff(Duration::from_millis(1)),
    );
    let mut ctx = ProcessingContext::new("SPT", ProcessingType::Po);

    let result = StepExecutor::new().run(&step, &mut ctx).await;
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.attempts, 2);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(reader.completed.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.data().height(), 0);
}
