//! Priority-ordered rule interpreter assigning a status per row
//!
//! Rules are evaluated in ascending priority. A rule only touches rows whose
//! status is still unset, so the first matching rule wins.

use crate::core::columns::{DEFAULT_DATE_RANGE, DESCRIPTION_RANGE, ERM_YYYYMM};
use crate::core::frame::{is_blank, parse_number, text_column};
use crate::core::{ProcessingType, StepError};
use polars::prelude::DataFrame;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// How the checks of one rule are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    #[default]
    And,
    Or,
}

/// Rule as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Lower values are evaluated first
    #[serde(default = "default_priority")]
    pub priority: i64,

    /// Status written to matching rows
    #[serde(alias = "status_value")]
    pub status: String,

    /// Label recorded for matched rows; defaults to the status
    #[serde(default)]
    pub note: Option<String>,

    #[serde(default)]
    pub combine: Combine,

    /// Processing types this rule applies to
    #[serde(default = "default_apply_to")]
    pub apply_to: Vec<ProcessingType>,

    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

fn default_priority() -> i64 {
    999
}

fn default_apply_to() -> Vec<ProcessingType> {
    vec![ProcessingType::Po, ProcessingType::Pr]
}

impl RuleConfig {
    pub fn new(priority: i64, status: impl Into<String>, checks: Vec<CheckConfig>) -> Self {
        Self {
            priority,
            status: status.into(),
            note: None,
            combine: Combine::And,
            apply_to: default_apply_to(),
            checks,
        }
    }

    pub fn with_combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// One check as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,

    /// Named condition supplied by the evaluation strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub negate: bool,
}

impl CheckConfig {
    /// Field-less check of the given type
    pub fn of(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    pub fn contains(field: &str, pattern: &str) -> Self {
        Self {
            field: Some(field.to_string()),
            pattern: Some(pattern.to_string()),
            ..Self::of("contains")
        }
    }

    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: Some(field.to_string()),
            value: Some(value.into()),
            ..Self::of("equals")
        }
    }

    pub fn condition(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::of("condition")
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

/// Named row masks built by an evaluation strategy
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    masks: HashMap<String, Vec<bool>>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, mask: Vec<bool>) {
        self.masks.insert(name.into(), mask);
    }

    pub fn get(&self, name: &str) -> Option<&[bool]> {
        self.masks.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

/// Everything a rule may look at
pub struct ConditionInput<'a> {
    pub frame: &'a DataFrame,
    pub processing_type: ProcessingType,
    /// Closing month as YYYYMM
    pub closing_month: i64,
    pub conditions: &'a ConditionSet,
}

/// Per-row status being assigned, plus the note of the rule that set it
#[derive(Debug, Clone, PartialEq)]
pub struct StatusAssignment {
    pub statuses: Vec<Option<String>>,
    pub notes: Vec<Option<String>>,
}

impl StatusAssignment {
    pub fn unset(rows: usize) -> Self {
        Self {
            statuses: vec![None; rows],
            notes: vec![None; rows],
        }
    }

    /// Start from an existing status column; blank values count as unset
    pub fn from_existing(statuses: Vec<Option<String>>) -> Self {
        let notes = vec![None; statuses.len()];
        let statuses = statuses
            .into_iter()
            .map(|status| if is_blank(status.as_deref()) { None } else { status })
            .collect();
        Self { statuses, notes }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn is_unset(&self, row: usize) -> bool {
        self.statuses[row].is_none()
    }

    pub fn unset_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_none()).count()
    }
}

/// Rows assigned by one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleHit {
    pub priority: i64,
    pub status: String,
    pub note: Option<String>,
    pub matched: usize,
}

#[derive(Debug, Clone)]
enum Predicate {
    Contains { field: String, regex: Regex },
    Equals { field: String, value: String },
    InList { field: String, values: Vec<String> },
    IsNull { field: String },
    NoStatus,
    ErmInRange,
    ErmLeClosing,
    ErmGtClosing,
    OutOfRange,
    FormatError,
    Condition(String),
    Fallback,
}

#[derive(Debug, Clone)]
struct Check {
    predicate: Predicate,
    negate: bool,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    priority: i64,
    status: String,
    note: Option<String>,
    combine: Combine,
    apply_to: Vec<ProcessingType>,
    checks: Vec<Check>,
}

/// Compiled, validated decision table
#[derive(Debug, Clone)]
pub struct ConditionEngine {
    rules: Vec<CompiledRule>,
}

impl ConditionEngine {
    /// Compile rules; any malformed rule is rejected before rows are seen
    pub fn new(rules: &[RuleConfig]) -> Result<Self, StepError> {
        let mut compiled = rules
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, _>>()?;
        compiled.sort_by_key(|rule| rule.priority);
        Ok(Self { rules: compiled })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Names of strategy conditions referenced by any rule
    pub fn condition_references(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .flat_map(|rule| rule.checks.iter())
            .filter_map(|check| match &check.predicate {
                Predicate::Condition(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Assign statuses to unset rows, returning per-rule hit counts
    pub fn apply(
        &self,
        input: &ConditionInput<'_>,
        assignment: &mut StatusAssignment,
    ) -> Result<Vec<RuleHit>, StepError> {
        let rows = input.frame.height();
        if assignment.len() != rows {
            return Err(StepError::Validation(format!(
                "status column has {} rows but data has {}",
                assignment.len(),
                rows
            )));
        }

        let mut columns = ColumnCache::new(input.frame);
        let mut hits = Vec::new();

        for rule in &self.rules {
            if !rule.apply_to.contains(&input.processing_type) {
                continue;
            }

            let Some(mask) = rule_mask(rule, input, assignment, &mut columns)? else {
                warn!(
                    "Skipping rule priority {} ({}): required data is missing",
                    rule.priority, rule.status
                );
                continue;
            };

            let mut matched = 0;
            for (row, hit) in mask.iter().enumerate() {
                if *hit && assignment.is_unset(row) {
                    assignment.statuses[row] = Some(rule.status.clone());
                    assignment.notes[row] =
                        Some(rule.note.clone().unwrap_or_else(|| rule.status.clone()));
                    matched += 1;
                }
            }

            debug!(
                "Rule priority {} -> {}: {} rows",
                rule.priority, rule.status, matched
            );
            hits.push(RuleHit {
                priority: rule.priority,
                status: rule.status.clone(),
                note: rule.note.clone(),
                matched,
            });
        }

        Ok(hits)
    }
}

fn compile_rule(rule: &RuleConfig) -> Result<CompiledRule, StepError> {
    let label = format!("rule priority {} ({})", rule.priority, rule.status);
    if rule.status.trim().is_empty() {
        return Err(StepError::RuleConfiguration(format!("{}: empty status", label)));
    }
    if rule.checks.is_empty() {
        return Err(StepError::RuleConfiguration(format!("{}: no checks", label)));
    }
    if rule.apply_to.is_empty() {
        return Err(StepError::RuleConfiguration(format!("{}: empty apply_to", label)));
    }

    let checks = rule
        .checks
        .iter()
        .map(|check| {
            compile_check(check)
                .map_err(|reason| StepError::RuleConfiguration(format!("{}: {}", label, reason)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledRule {
        priority: rule.priority,
        status: rule.status.clone(),
        note: rule.note.clone(),
        combine: rule.combine,
        apply_to: rule.apply_to.clone(),
        checks,
    })
}

fn compile_check(check: &CheckConfig) -> Result<Check, String> {
    let field = || {
        check
            .field
            .clone()
            .ok_or_else(|| format!("check '{}' needs a field", check.kind))
    };
    let value = || {
        check
            .value
            .as_ref()
            .map(literal_text)
            .ok_or_else(|| format!("check '{}' needs a value", check.kind))
    };
    let values = || {
        if check.values.is_empty() {
            Err(format!("check '{}' needs values", check.kind))
        } else {
            Ok(check.values.iter().map(literal_text).collect::<Vec<_>>())
        }
    };
    let regex = || {
        let pattern = check
            .pattern
            .as_deref()
            .ok_or_else(|| format!("check '{}' needs a pattern", check.kind))?;
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))
    };

    let (predicate, inverted) = match check.kind.as_str() {
        "contains" => (Predicate::Contains { field: field()?, regex: regex()? }, false),
        "not_contains" => (Predicate::Contains { field: field()?, regex: regex()? }, true),
        "equals" => (Predicate::Equals { field: field()?, value: value()? }, false),
        "not_equals" => (Predicate::Equals { field: field()?, value: value()? }, true),
        "in_list" => (Predicate::InList { field: field()?, values: values()? }, false),
        "not_in_list" => (Predicate::InList { field: field()?, values: values()? }, true),
        "is_null" => (Predicate::IsNull { field: field()? }, false),
        "is_not_null" => (Predicate::IsNull { field: field()? }, true),
        "no_status" => (Predicate::NoStatus, false),
        "erm_in_range" => (Predicate::ErmInRange, false),
        "erm_le_closing" => (Predicate::ErmLeClosing, false),
        "erm_gt_closing" => (Predicate::ErmGtClosing, false),
        "out_of_range" => (Predicate::OutOfRange, false),
        "format_error" => (Predicate::FormatError, false),
        "fallback" => (Predicate::Fallback, false),
        "condition" => {
            let name = check
                .name
                .clone()
                .ok_or_else(|| "check 'condition' needs a name".to_string())?;
            (Predicate::Condition(name), false)
        }
        other => return Err(format!("unknown check type '{}'", other)),
    };

    Ok(Check {
        predicate,
        negate: inverted ^ check.negate,
    })
}

fn literal_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Combined mask of one rule, `None` when a column it needs is missing
fn rule_mask(
    rule: &CompiledRule,
    input: &ConditionInput<'_>,
    assignment: &StatusAssignment,
    columns: &mut ColumnCache<'_>,
) -> Result<Option<Vec<bool>>, StepError> {
    let rows = input.frame.height();
    let mut combined = match rule.combine {
        Combine::And => vec![true; rows],
        Combine::Or => vec![false; rows],
    };

    for check in &rule.checks {
        let Some(mut mask) = check_mask(&check.predicate, input, assignment, columns)? else {
            return Ok(None);
        };
        if check.negate {
            mask.iter_mut().for_each(|m| *m = !*m);
        }
        for (acc, m) in combined.iter_mut().zip(mask) {
            *acc = match rule.combine {
                Combine::And => *acc && m,
                Combine::Or => *acc || m,
            };
        }
    }

    Ok(Some(combined))
}

fn check_mask(
    predicate: &Predicate,
    input: &ConditionInput<'_>,
    assignment: &StatusAssignment,
    columns: &mut ColumnCache<'_>,
) -> Result<Option<Vec<bool>>, StepError> {
    let rows = input.frame.height();
    let mask: Option<Vec<bool>> = match predicate {
        Predicate::Contains { field, regex } => columns.text(field)?.map(|values| {
            values
                .iter()
                .map(|v| v.as_deref().is_some_and(|v| regex.is_match(v)))
                .collect()
        }),
        Predicate::Equals { field, value } => columns.text(field)?.map(|values| {
            values
                .iter()
                .map(|v| v.as_deref().is_some_and(|v| literal_matches(v, value)))
                .collect()
        }),
        Predicate::InList { field, values: list } => columns.text(field)?.map(|values| {
            values
                .iter()
                .map(|v| {
                    v.as_deref()
                        .is_some_and(|v| list.iter().any(|item| literal_matches(v, item)))
                })
                .collect()
        }),
        Predicate::IsNull { field } => columns
            .text(field)?
            .map(|values| values.iter().map(|v| is_blank(v.as_deref())).collect()),
        Predicate::NoStatus => Some((0..rows).map(|row| assignment.is_unset(row)).collect()),
        Predicate::ErmInRange => columns.erm_and_ranges()?.map(|(erm, ranges)| {
            erm.into_iter()
                .zip(ranges)
                .map(|(erm, range)| in_range(erm, range))
                .collect()
        }),
        Predicate::ErmLeClosing => columns.erm()?.map(|erm| {
            erm.iter()
                .map(|e| e.is_some_and(|e| e <= input.closing_month))
                .collect()
        }),
        Predicate::ErmGtClosing => columns.erm()?.map(|erm| {
            erm.iter()
                .map(|e| e.is_some_and(|e| e > input.closing_month))
                .collect()
        }),
        Predicate::OutOfRange => {
            let raw = columns
                .text(DESCRIPTION_RANGE)?
                .map(|values| values.iter().map(|v| is_format_error(v.as_deref())).collect::<Vec<_>>());
            match (columns.erm_and_ranges()?, raw) {
                (Some((erm, ranges)), Some(format_errors)) => Some(
                    erm.into_iter()
                        .zip(ranges)
                        .zip(format_errors)
                        .map(|((erm, range), bad)| !bad && !in_range(erm, range))
                        .collect(),
                ),
                _ => None,
            }
        }
        Predicate::FormatError => columns
            .text(DESCRIPTION_RANGE)?
            .map(|values| values.iter().map(|v| is_format_error(v.as_deref())).collect()),
        Predicate::Condition(name) => match input.conditions.get(name) {
            Some(mask) if mask.len() == rows => Some(mask.to_vec()),
            Some(mask) => {
                return Err(StepError::Validation(format!(
                    "condition '{}' has {} rows but data has {}",
                    name,
                    mask.len(),
                    rows
                )))
            }
            None => None,
        },
        Predicate::Fallback => Some(vec![true; rows]),
    };
    Ok(mask)
}

fn literal_matches(cell: &str, literal: &str) -> bool {
    let cell = cell.trim();
    if cell == literal {
        return true;
    }
    match (parse_number(cell), parse_number(literal)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn in_range(erm: Option<i64>, range: Option<(i64, i64)>) -> bool {
    match (erm, range) {
        (Some(erm), Some((start, end))) => start <= erm && erm <= end,
        _ => false,
    }
}

fn is_format_error(range: Option<&str>) -> bool {
    range.is_some_and(|r| r.trim() == DEFAULT_DATE_RANGE)
}

/// Parse `YYYYMM,YYYYMM`
pub fn parse_range(range: &str) -> Option<(i64, i64)> {
    let (start, end) = range.trim().split_once(',')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Lazily materialized columns shared by all rules of one pass
struct ColumnCache<'a> {
    frame: &'a DataFrame,
    text: HashMap<String, Option<Vec<Option<String>>>>,
    erm: Option<Option<Vec<Option<i64>>>>,
    ranges: Option<Option<Vec<Option<(i64, i64)>>>>,
}

impl<'a> ColumnCache<'a> {
    fn new(frame: &'a DataFrame) -> Self {
        Self {
            frame,
            text: HashMap::new(),
            erm: None,
            ranges: None,
        }
    }

    fn text(&mut self, name: &str) -> Result<Option<&[Option<String>]>, StepError> {
        if !self.text.contains_key(name) {
            let values = text_column(self.frame, name)?;
            self.text.insert(name.to_string(), values);
        }
        Ok(self.text.get(name).and_then(|v| v.as_deref()))
    }

    fn erm(&mut self) -> Result<Option<&[Option<i64>]>, StepError> {
        if self.erm.is_none() {
            let values = self.text(ERM_YYYYMM)?.map(|values| {
                values
                    .iter()
                    .map(|v| v.as_deref().and_then(parse_number).map(|n| n as i64))
                    .collect()
            });
            self.erm = Some(values);
        }
        Ok(self.erm.as_ref().and_then(|v| v.as_deref()))
    }

    fn ranges(&mut self) -> Result<Option<&[Option<(i64, i64)>]>, StepError> {
        if self.ranges.is_none() {
            let values = self
                .text(DESCRIPTION_RANGE)?
                .map(|values| values.iter().map(|v| v.as_deref().and_then(parse_range)).collect());
            self.ranges = Some(values);
        }
        Ok(self.ranges.as_ref().and_then(|v| v.as_deref()))
    }

    fn erm_and_ranges(&mut self) -> Result<Option<(Vec<Option<i64>>, Vec<Option<(i64, i64)>>)>, StepError> {
        let erm = self.erm()?.map(<[_]>::to_vec);
        let ranges = self.ranges()?.map(<[_]>::to_vec);
        Ok(erm.zip(ranges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn run(rules: &[RuleConfig], frame: &DataFrame) -> Vec<Option<String>> {
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
    fn test_first_match_wins_regardless_of_declaration_order() {
        let frame = df! { "desc" => &["Affiliate rental", "plain item"] }.unwrap();
        let rules = vec![
            RuleConfig::new(6, "未完成", vec![CheckConfig::of("fallback")]),
            RuleConfig::new(1, "Affiliate", vec![CheckConfig::contains("desc", "(?i)affiliate")]),
        ];

        assert_eq!(
            run(&rules, &frame),
            vec![Some("Affiliate".into()), Some("未完成".into())]
        );
    }

    #[test]
    fn test_unmatched_rows_stay_unset() {
        let frame = df! { "desc" => &["rent", "other"] }.unwrap();
        let rules = vec![RuleConfig::new(1, "Rent", vec![CheckConfig::contains("desc", "RENT")])];

        assert_eq!(run(&rules, &frame), vec![Some("Rent".into()), None]);
    }

    #[test]
    fn test_existing_status_is_not_overwritten() {
        let frame = df! { "desc" => &["a", "b", "c"] }.unwrap();
        let engine =
            ConditionEngine::new(&[RuleConfig::new(1, "New", vec![CheckConfig::of("fallback")])]).unwrap();
        let conditions = ConditionSet::new();
        let input = ConditionInput {
            frame: &frame,
            processing_type: ProcessingType::Po,
            closing_month: 202403,
            conditions: &conditions,
        };
        let mut assignment =
            StatusAssignment::from_existing(vec![Some("Old".into()), Some("nan".into()), None]);
        let hits = engine.apply(&input, &mut assignment).unwrap();

        assert_eq!(
            assignment.statuses,
            vec![Some("Old".into()), Some("New".into()), Some("New".into())]
        );
        assert_eq!(hits[0].matched, 2);
    }

    #[test]
    fn test_or_combination_and_negation() {
        let frame = df! {
            "desc" => &["rent", "salary", "other"],
            "gl" => &["100", "200", "300"],
        }
        .unwrap();
        let rules = vec![RuleConfig::new(
            1,
            "Hit",
            vec![
                CheckConfig::contains("desc", "rent"),
                CheckConfig::equals("gl", 300).negated().negated(),
            ],
        )
        .with_combine(Combine::Or)];

        assert_eq!(run(&rules, &frame), vec![Some("Hit".into()), None, Some("Hit".into())]);
    }

    #[test]
    fn test_erm_checks_use_closing_month() {
        let frame = df! {
            ERM_YYYYMM => &[202402i64, 202405, 202402],
            DESCRIPTION_RANGE => &["202401,202412", "202401,202412", DEFAULT_DATE_RANGE],
        }
        .unwrap();
        let rules = vec![
            RuleConfig::new(1, "格式錯誤", vec![CheckConfig::of("format_error")]),
            RuleConfig::new(
                2,
                "已完成",
                vec![CheckConfig::of("erm_in_range"), CheckConfig::of("erm_le_closing")],
            ),
            RuleConfig::new(3, "未完成", vec![CheckConfig::of("erm_gt_closing")]),
        ];

        assert_eq!(
            run(&rules, &frame),
            vec![Some("已完成".into()), Some("未完成".into()), Some("格式錯誤".into())]
        );
    }

    #[test]
    fn test_rule_with_missing_column_is_skipped() {
        let frame = df! { "desc" => &["x"] }.unwrap();
        let rules = vec![
            RuleConfig::new(1, "Never", vec![CheckConfig::contains("absent", "x")]),
            RuleConfig::new(2, "Fallback", vec![CheckConfig::of("fallback")]),
        ];

        assert_eq!(run(&rules, &frame), vec![Some("Fallback".into())]);
    }

    #[test]
    fn test_apply_to_filters_processing_type() {
        let frame = df! { "desc" => &["x"] }.unwrap();
        let mut pr_only = RuleConfig::new(1, "PR only", vec![CheckConfig::of("fallback")]);
        pr_only.apply_to = vec![ProcessingType::Pr];

        assert_eq!(run(&[pr_only], &frame), vec![None]);
    }

    #[test]
    fn test_unknown_check_type_is_rejected_at_construction() {
        let rules = vec![RuleConfig::new(1, "X", vec![CheckConfig::of("sounds_like")])];
        let err = ConditionEngine::new(&rules).unwrap_err();
        assert!(matches!(err, StepError::RuleConfiguration(_)));
        assert!(err.to_string().contains("sounds_like"));
    }

    #[test]
    fn test_malformed_checks_are_rejected() {
        let missing_pattern = CheckConfig {
            field: Some("desc".into()),
            ..CheckConfig::of("contains")
        };
        let bad_regex = CheckConfig::contains("desc", "(unclosed");
        for check in [missing_pattern, bad_regex, CheckConfig::of("equals")] {
            let err = ConditionEngine::new(&[RuleConfig::new(1, "X", vec![check])]).unwrap_err();
            assert!(matches!(err, StepError::RuleConfiguration(_)));
        }
        let empty = RuleConfig::new(1, "X", vec![]);
        assert!(ConditionEngine::new(&[empty]).is_err());
    }

    #[test]
    fn test_rules_parse_from_yaml() {
        let yaml = r#"
- priority: 2
  status_value: "Check收貨"
  combine: or
  checks:
    - type: not_contains
      field: "Remarked by Procurement"
      pattern: "error"
    - type: condition
      name: qty_matched
      negate: true
"#;
        let rules: Vec<RuleConfig> = serde_yaml::from_str(yaml).unwrap();
        let engine = ConditionEngine::new(&rules).unwrap();
        assert_eq!(engine.rule_count(), 1);
        assert_eq!(rules[0].combine, Combine::Or);
        assert_eq!(rules[0].apply_to.len(), 2);
        assert!(engine.condition_references().contains("qty_matched"));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("202401,202412"), Some((202401, 202412)));
        assert_eq!(parse_range("garbage"), None);
    }
}
