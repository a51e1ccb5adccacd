//! Test: decision-table semantics of the condition engine

use accrual_pipeline::core::{
    CheckConfig, ConditionEngine, ConditionInput, ConditionSet, ProcessingType, RuleConfig, StatusAssignment,
};
use accrual_pipeline::steps::accrual_flags;
use polars::prelude::*;

fn evaluate(rules: &[RuleConfig], frame: &DataFrame) -> Vec<Option<String>> {
    let engine = ConditionEngine::new(rules).unwrap();
    let conditions = ConditionSet::new();
    let input = ConditionInput {
        frame,
        processing_type: ProcessingType::Po,
        closing_month: 202403,
        conditions: &conditions,
    };
    let mut assignment = StatusAssignment::unset(frame.height());
    engine.apply(&input, &mut assignment).unwrap();
    assignment.statuses
}

#[test]
fn test_affiliate_scenario() {
    let frame = df! { "desc" => &["Affiliate rental", "plain item"] }.unwrap();
    let rules = vec![
        RuleConfig::new(1, "Affiliate", vec![CheckConfig::contains("desc", "(?i)affiliate")]),
        RuleConfig::new(6, "未完成", vec![CheckConfig::of("fallback")]),
    ];

    let statuses = evaluate(&rules, &frame);

    assert_eq!(statuses, vec![Some("Affiliate".to_string()), Some("未完成".to_string())]);
}

/// The first matching rule in priority order wins, regardless of list order
#[test]
fn test_first_match_in_priority_order() {
    let frame = df! {
        "desc" => &["rent office", "rent car", "laptop", "desk"],
        "vendor" => &["A", "B", "B", "C"],
    }
    .unwrap();
    let rules = vec![
        RuleConfig::new(5, "vendor B", vec![CheckConfig::equals("vendor", "B")]),
        RuleConfig::new(2, "rent", vec![CheckConfig::contains("desc", "rent")]),
        RuleConfig::new(9, "laptop", vec![CheckConfig::contains("desc", "laptop")]),
    ];

    let statuses = evaluate(&rules, &frame);

    assert_eq!(
        statuses,
        vec![
            Some("rent".to_string()),
            Some("rent".to_string()),
            Some("vendor B".to_string()),
            None,
        ]
    );
}

#[test]
fn test_rule_on_missing_column_is_skipped() {
    let frame = df! { "desc" => &["a", "b"] }.unwrap();
    let rules = vec![
        RuleConfig::new(1, "never", vec![CheckConfig::contains("no_such_column", "x")]),
        RuleConfig::new(2, "rest", vec![CheckConfig::of("fallback")]),
    ];

    let statuses = evaluate(&rules, &frame);

    assert_eq!(statuses, vec![Some("rest".to_string()), Some("rest".to_string())]);
}

#[test]
fn test_accrual_flag_is_idempotent() {
    let statuses = vec![
        Some("已完成".to_string()),
        Some("未完成".to_string()),
        None,
        Some("已完成(check qty)".to_string()),
    ];

    let first = accrual_flags(&statuses);
    let second = accrual_flags(&statuses);

    assert_eq!(first, second);
    assert_eq!(first, vec![true, false, false, true]);
}
