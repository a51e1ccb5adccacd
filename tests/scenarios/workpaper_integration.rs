//! Test: loading, workpaper integration and ERM evaluation built from configuration

use crate::helpers::*;
use accrual_pipeline::core::columns::{ACCRUAL_FLAG, REMARK_PREVIOUS_FN, REMARK_PROCUREMENT};
use accrual_pipeline::core::frame::text_column;
use accrual_pipeline::core::{AppConfig, ErrorKind, ExecutionStatus, ProcessingContext, ProcessingType, StepStatus};
use accrual_pipeline::orchestrator::PipelineOrchestrator;
use accrual_pipeline::source::{FetchPool, FilePaths, FileSpec};
use polars::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG: &str = r#"
pipelines:
  SPT:
    po: [DataLoading, PreviousWorkpaperIntegration, ProcurementIntegration, DateLogic, ErmEvaluation]
"#;

fn raw_po() -> DataFrame {
    df! {
        "PO#" => &["PO001", "PO002", "PO003"],
        "Line#" => &["1", "1.0", "1"],
        "GL#" => &["6200", "6200", "6200"],
        "Item Description" => &["Laptop 2024/01-2024/12", "Server 2024/01-2024/12", "Desk 2024/01-2024/12"],
        "Expected Receive Month" => &["Mar-24", "Mar-24", "Apr-24"],
        "Entry Quantity" => &["1", "2", "1"],
        "Received Quantity" => &["1", "2", "0"],
        "Entry Amount" => &["100", "200", "50"],
        "Entry Billed Amount" => &["0", "0", "0"],
    }
    .unwrap()
}

fn spec(dir: &TempDir, name: &str) -> FileSpec {
    FileSpec::from(touch(dir.path(), name).as_str())
}

fn run_inputs(dir: &TempDir, with_workpapers: bool) -> (FilePaths, MockReader) {
    let mut paths = FilePaths::new();
    paths.insert("raw_po".into(), spec(dir, "202403_purchase_order.csv"));
    paths.insert("reference_account".into(), spec(dir, "account.csv"));
    paths.insert("reference_liability".into(), spec(dir, "liability.csv"));

    let mut reader = MockReader::new()
        .serve("202403_purchase_order.csv", raw_po())
        .serve("account.csv", df! { "Account" => &["6200"], "Account Desc" => &["Equipment"] }.unwrap())
        .serve("liability.csv", df! { "Account" => &["6200"], "Liability" => &["200100"] }.unwrap());

    if with_workpapers {
        paths.insert("previous".into(), spec(dir, "previous.csv"));
        paths.insert("procurement_po".into(), spec(dir, "procurement_po.csv"));
        reader = reader
            .serve(
                "previous.csv",
                df! {
                    "PO Line" => &["PO001-1", "PO003-1"],
                    "Remarked by FN" => &[Some("已入帳"), None],
                }
                .unwrap(),
            )
            .serve(
                "procurement_po.csv",
                df! {
                    "PO Line" => &["PO002-1"],
                    "Remarked by Procurement" => &["已完成"],
                }
                .unwrap(),
            );
    }
    (paths, reader)
}

fn texts(ctx: &ProcessingContext, column: &str) -> Vec<Option<String>> {
    text_column(ctx.data(), column).unwrap().unwrap()
}

#[tokio::test]
async fn test_workpaper_remarks_drive_erm_statuses() {
    let dir = TempDir::new().unwrap();
    let (paths, reader) = run_inputs(&dir, true);
    let config = AppConfig::from_yaml(CONFIG).unwrap();
    let orchestrator = PipelineOrchestrator::new(Arc::new(config), Arc::new(reader), FetchPool::new(2));
    let pipeline = orchestrator.build("SPT", ProcessingType::Po, &paths, Vec::new()).unwrap();
    let mut ctx = ProcessingContext::new("SPT", ProcessingType::Po);

    let run = pipeline.execute(&mut ctx).await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    assert!(run.results.iter().all(|r| r.status == StepStatus::Success));
    assert_eq!(
        texts(&ctx, REMARK_PREVIOUS_FN),
        vec![Some("已入帳".to_string()), None, None]
    );
    assert_eq!(texts(&ctx, REMARK_PROCUREMENT)[1].as_deref(), Some("已完成"));
    assert_eq!(
        texts(&ctx, "PO狀態"),
        vec![
            Some("已入帳".to_string()),
            Some("已完成".to_string()),
            Some("未完成".to_string()),
        ]
    );
    assert_eq!(
        texts(&ctx, ACCRUAL_FLAG),
        vec![Some("N".to_string()), Some("Y".to_string()), Some("N".to_string())]
    );
}

#[tokio::test]
async fn test_missing_workpapers_fail_integration_but_not_the_run() {
    let dir = TempDir::new().unwrap();
    let (paths, reader) = run_inputs(&dir, false);
    let config = AppConfig::from_yaml(CONFIG).unwrap();
    let orchestrator = PipelineOrchestrator::new(Arc::new(config), Arc::new(reader), FetchPool::new(2));
    let pipeline = orchestrator.build("SPT", ProcessingType::Po, &paths, Vec::new()).unwrap();
    let mut ctx = ProcessingContext::new("SPT", ProcessingType::Po);

    let run = pipeline.execute(&mut ctx).await;

    let integration: Vec<_> = run.results.iter().filter(|r| r.step_name.ends_with("Integration")).collect();
    assert_eq!(integration.len(), 2);
    assert!(integration
        .iter()
        .all(|r| r.status == StepStatus::Failed && r.error_kind == Some(ErrorKind::Lookup)));
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(texts(&ctx, "PO狀態")[2].as_deref(), Some("未完成"));
}
