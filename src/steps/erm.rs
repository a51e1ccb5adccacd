//! ERM evaluation strategy - conditions, default rules and accounting columns

use super::evaluation::EvaluationStrategy;
use crate::core::columns::*;
use crate::core::frame::{is_blank, number_column, parse_number, set_number_column, set_text_column, text_column};
use crate::core::{ConditionSet, EntityProfile, ProcessingContext, RuleConfig, StepError};
use polars::prelude::*;
use regex::RegexBuilder;
use std::collections::HashMap;
use tracing::{debug, warn};

const DEFAULT_RULES: &str = include_str!("erm_rules.yaml");

/// Built-in ERM decision table
pub fn default_rules() -> Result<Vec<RuleConfig>, StepError> {
    serde_yaml::from_str(DEFAULT_RULES)
        .map_err(|e| StepError::RuleConfiguration(format!("built-in ERM rules: {}", e)))
}

const CONDITIONS: &[&str] = &[
    "quantity_matched",
    "not_billed",
    "has_billing",
    "fully_billed",
    "has_unpaid",
    "billed_nonzero",
    "received_nonzero",
    "completed_remark",
    "pr_not_incomplete",
    "procurement_not_error",
    "is_fa",
];

/// Strategy for the expected-received-month evaluation
#[derive(Debug, Clone, Default)]
pub struct ErmStrategy {
    profile: EntityProfile,
}

impl ErmStrategy {
    pub fn new(profile: EntityProfile) -> Self {
        Self { profile }
    }
}

fn numbers(frame: &DataFrame, column: &str) -> Result<Option<Vec<Option<f64>>>, StepError> {
    Ok(number_column(frame, column)?)
}

/// Text column, or all-null when absent
fn texts_or_null(frame: &DataFrame, column: &str) -> Result<Vec<Option<String>>, StepError> {
    Ok(text_column(frame, column)?.unwrap_or_else(|| vec![None; frame.height()]))
}

fn remark_matches(frame: &DataFrame, column: &str, pattern: &str) -> Result<Vec<bool>, StepError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| StepError::RuleConfiguration(e.to_string()))?;
    Ok(texts_or_null(frame, column)?
        .iter()
        .map(|v| v.as_deref().is_some_and(|v| regex.is_match(v)))
        .collect())
}

fn compare(a: &[Option<f64>], b: &[Option<f64>], op: impl Fn(f64, f64) -> bool) -> Vec<bool> {
    a.iter()
        .zip(b)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => op(*a, *b),
            _ => false,
        })
        .collect()
}

fn each(values: &[Option<f64>], test: impl Fn(f64) -> bool) -> Vec<bool> {
    values.iter().map(|v| v.is_some_and(&test)).collect()
}

/// Key column -> value column of a reference dataset
fn reference_map(frame: &DataFrame, key: &str, value: &str) -> Result<HashMap<String, String>, StepError> {
    let keys = texts_or_null(frame, key)?;
    let values = texts_or_null(frame, value)?;
    Ok(keys
        .into_iter()
        .zip(values)
        .filter_map(|(k, v)| Some((k?.trim().to_string(), v?)))
        .collect())
}

/// Replace flagged rows of a text column, keeping other rows as they were
fn assign_text(
    frame: &mut DataFrame,
    column: &str,
    flags: &[bool],
    value: impl Fn(usize) -> Option<String>,
) -> Result<(), StepError> {
    let mut values = texts_or_null(frame, column)?;
    for (row, flagged) in flags.iter().enumerate() {
        if *flagged {
            values[row] = value(row);
        }
    }
    set_text_column(frame, column, values)?;
    Ok(())
}

/// Anything but an explicit zero counts as billed, missing values included
fn has_billing(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => parse_number(v).map_or(v.trim() != "0", |n| n != 0.0),
    }
}

fn is_prepaid(value: Option<&str>) -> bool {
    match value {
        v if is_blank(v) => false,
        Some(v) => parse_number(v).map_or(v.trim() != "0", |n| n != 0.0),
        None => false,
    }
}

impl EvaluationStrategy for ErmStrategy {
    fn provided_conditions(&self) -> &[&'static str] {
        CONDITIONS
    }

    fn required_columns(&self) -> Vec<&'static str> {
        vec![GL_ACCOUNT, ERM_YYYYMM, DESCRIPTION_RANGE]
    }

    fn build_conditions(&self, frame: &DataFrame, _context: &ProcessingContext) -> Result<ConditionSet, StepError> {
        let mut set = ConditionSet::new();

        let entry_qty = numbers(frame, ENTRY_QUANTITY)?;
        let received_qty = numbers(frame, RECEIVED_QUANTITY)?;
        if let (Some(entry), Some(received)) = (&entry_qty, &received_qty) {
            set.insert("quantity_matched", compare(entry, received, |a, b| a == b));
        }
        if let Some(received) = &received_qty {
            set.insert("received_nonzero", each(received, |q| q != 0.0));
        }

        if let Some(billed_qty) = text_column(frame, BILLED_QUANTITY)? {
            set.insert("has_billing", billed_qty.iter().map(|v| has_billing(v.as_deref())).collect());
        }

        let amount = numbers(frame, ENTRY_AMOUNT)?;
        let billed_amount = numbers(frame, ENTRY_BILLED_AMOUNT)?;
        if let Some(billed) = &billed_amount {
            set.insert("not_billed", each(billed, |a| a == 0.0));
            set.insert("billed_nonzero", each(billed, |a| a != 0.0));
        }
        if let (Some(amount), Some(billed)) = (&amount, &billed_amount) {
            set.insert("fully_billed", compare(amount, billed, |a, b| (a - b).abs() < 1e-9));
            set.insert("has_unpaid", compare(amount, billed, |a, b| (a - b).abs() >= 1e-9));
        }

        let procurement_done = remark_matches(frame, REMARK_PROCUREMENT, "已完成|rent")?;
        let fn_done = remark_matches(frame, REMARK_PREVIOUS_FN, "已完成|已入帳")?;
        set.insert(
            "completed_remark",
            procurement_done.iter().zip(&fn_done).map(|(a, b)| *a || *b).collect(),
        );
        set.insert(
            "pr_not_incomplete",
            remark_matches(frame, REMARK_PREVIOUS_FN_PR, "未完成")?
                .into_iter()
                .map(|m| !m)
                .collect(),
        );
        set.insert(
            "procurement_not_error",
            texts_or_null(frame, REMARK_PROCUREMENT)?
                .iter()
                .map(|v| v.as_deref().map(str::trim) != Some("error"))
                .collect(),
        );

        let accounts = texts_or_null(frame, GL_ACCOUNT)?;
        set.insert(
            "is_fa",
            accounts
                .iter()
                .map(|a| a.as_deref().is_some_and(|a| self.profile.fa_accounts.iter().any(|fa| fa == a.trim())))
                .collect(),
        );

        debug!("Built {} ERM conditions", set.len());
        Ok(set)
    }

    fn set_accounting_fields(
        &self,
        frame: &mut DataFrame,
        flags: &[bool],
        context: &ProcessingContext,
    ) -> Result<(), StepError> {
        let rows = frame.height();
        let accounts = texts_or_null(frame, GL_ACCOUNT)?;

        assign_text(frame, ACCOUNT_CODE, flags, |row| accounts[row].clone())?;
        let codes = texts_or_null(frame, ACCOUNT_CODE)?;

        match context.get_auxiliary_data(REFERENCE_ACCOUNT) {
            Some(reference) => {
                let names = reference_map(reference, REF_ACCOUNT, REF_ACCOUNT_DESC)?;
                let values = codes
                    .iter()
                    .map(|c| c.as_deref().and_then(|c| names.get(c.trim()).cloned()))
                    .collect();
                set_text_column(frame, ACCOUNT_NAME, values)?;
            }
            None => warn!("No account reference, Account Name left empty"),
        }

        assign_text(frame, REGION, flags, |_| Some(self.profile.region.clone()))?;

        let departments = texts_or_null(frame, DEPARTMENT)?;
        assign_text(frame, DEPARTMENT_CODE, flags, |row| {
            let in_dept = codes[row]
                .as_deref()
                .is_some_and(|c| self.profile.dept_accounts.iter().any(|d| d == c.trim()));
            if in_dept {
                departments[row].as_deref().map(|d| d.chars().take(3).collect())
            } else {
                Some("000".to_string())
            }
        })?;

        let currencies = texts_or_null(frame, CURRENCY)?;
        assign_text(frame, CURRENCY_CODE, flags, |row| currencies[row].clone())?;

        let price = numbers(frame, UNIT_PRICE)?.unwrap_or_else(|| vec![None; rows]);
        let entry_qty = numbers(frame, ENTRY_QUANTITY)?.unwrap_or_else(|| vec![None; rows]);
        let billed_qty = numbers(frame, BILLED_QUANTITY)?.unwrap_or_else(|| vec![None; rows]);
        let mut amounts = numbers(frame, ACCRUAL_AMOUNT)?.unwrap_or_else(|| vec![None; rows]);
        for (row, flagged) in flags.iter().enumerate() {
            if *flagged {
                amounts[row] = match (price[row], entry_qty[row], billed_qty[row]) {
                    (Some(p), Some(e), Some(b)) => Some(p * (e - b)),
                    _ => None,
                };
            }
        }
        set_number_column(frame, ACCRUAL_AMOUNT, amounts)?;

        let prepaid: Vec<bool> = texts_or_null(frame, ENTRY_PREPAY_AMOUNT)?
            .iter()
            .zip(flags)
            .map(|(v, flagged)| *flagged && is_prepaid(v.as_deref()))
            .collect();
        assign_text(frame, HAS_PREPAYMENT, &prepaid, |_| Some("Y".to_string()))?;

        let liabilities = match context.get_auxiliary_data(REFERENCE_LIABILITY) {
            Some(reference) => reference_map(reference, REF_ACCOUNT, LIABILITY)?,
            None => HashMap::new(),
        };
        let values = codes
            .iter()
            .zip(&prepaid)
            .map(|(code, prepaid)| {
                if *prepaid {
                    Some(self.profile.prepayment_liability.clone())
                } else {
                    code.as_deref().and_then(|c| liabilities.get(c.trim()).cloned())
                }
            })
            .collect();
        set_text_column(frame, LIABILITY, values)?;

        Ok(())
    }
}
