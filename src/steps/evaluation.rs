//! Evaluation step - rule-driven status assignment and accrual flagging

use crate::core::columns::{
    ACCRUAL_FLAG, COMPLETION_MARKER, DEFAULT_DATE_RANGE, DESCRIPTION_RANGE, FILE_DATE, FORMAT_ERROR_STATUS,
    MATCHED_CONDITION, REFERENCE_ACCOUNT, REFERENCE_LIABILITY,
};
use crate::core::frame::{missing_columns, set_text_column, text_column};
use crate::core::{
    ConditionEngine, ConditionInput, ConditionSet, PipelineStep, ProcessingContext, RuleConfig, RuleHit,
    StatusAssignment, StepError, StepOptions, StepResult, UnparseableRangePolicy,
};
use async_trait::async_trait;
use polars::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Entity-specific hooks of the evaluation step
pub trait EvaluationStrategy: Send + Sync {
    /// Names of the condition masks [`build_conditions`](Self::build_conditions) may supply
    fn provided_conditions(&self) -> &[&'static str];

    /// Columns the primary dataset must carry
    fn required_columns(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Auxiliary datasets that must be present
    fn required_references(&self) -> Vec<&'static str> {
        vec![REFERENCE_ACCOUNT, REFERENCE_LIABILITY]
    }

    fn build_conditions(&self, frame: &DataFrame, context: &ProcessingContext) -> Result<ConditionSet, StepError>;

    fn apply_status(
        &self,
        engine: &ConditionEngine,
        input: &ConditionInput<'_>,
        assignment: &mut StatusAssignment,
    ) -> Result<Vec<RuleHit>, StepError> {
        engine.apply(input, assignment)
    }

    /// Fill accounting columns; `flags[i]` marks rows selected for accrual
    fn set_accounting_fields(
        &self,
        frame: &mut DataFrame,
        flags: &[bool],
        context: &ProcessingContext,
    ) -> Result<(), StepError>;
}

/// True where the status carries the completion marker
pub fn accrual_flags(statuses: &[Option<String>]) -> Vec<bool> {
    statuses
        .iter()
        .map(|s| s.as_deref().is_some_and(|s| s.contains(COMPLETION_MARKER)))
        .collect()
}

/// Generic evaluation driver
pub struct EvaluationStep<S> {
    name: String,
    strategy: S,
    engine: ConditionEngine,
    policy: UnparseableRangePolicy,
    options: StepOptions,
}

impl<S: EvaluationStrategy> EvaluationStep<S> {
    /// Compile the rules; any unknown check or condition name fails here
    pub fn new(
        name: impl Into<String>,
        strategy: S,
        rules: &[RuleConfig],
        policy: UnparseableRangePolicy,
    ) -> Result<Self, StepError> {
        let engine = ConditionEngine::new(rules)?;
        let provided = strategy.provided_conditions();
        for reference in engine.condition_references() {
            if !provided.contains(&reference) {
                return Err(StepError::RuleConfiguration(format!(
                    "unknown condition '{}'; available: {}",
                    reference,
                    provided.join(", ")
                )));
            }
        }

        Ok(Self {
            name: name.into(),
            strategy,
            engine,
            policy,
            options: StepOptions::default(),
        })
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn engine(&self) -> &ConditionEngine {
        &self.engine
    }

    /// Rows still unset whose description range is the unparseable marker
    fn apply_range_policy(&self, frame: &DataFrame, assignment: &mut StatusAssignment) -> Result<usize, StepError> {
        let Some(ranges) = text_column(frame, DESCRIPTION_RANGE)? else {
            return Ok(0);
        };
        let rows: Vec<usize> = ranges
            .iter()
            .enumerate()
            .filter(|(row, range)| {
                assignment.is_unset(*row) && range.as_deref().is_some_and(|r| r.trim() == DEFAULT_DATE_RANGE)
            })
            .map(|(row, _)| row)
            .collect();

        if rows.is_empty() {
            return Ok(0);
        }
        match self.policy {
            UnparseableRangePolicy::FormatError => {
                for &row in &rows {
                    assignment.statuses[row] = Some(FORMAT_ERROR_STATUS.to_string());
                    assignment.notes[row] = Some("format_error".to_string());
                }
            }
            UnparseableRangePolicy::LeaveUnset => {}
            UnparseableRangePolicy::Reject => {
                return Err(StepError::Validation(format!(
                    "{} rows have an unparseable description date range",
                    rows.len()
                )))
            }
        }
        warn!("{} rows with unparseable description date range ({:?})", rows.len(), self.policy);
        Ok(rows.len())
    }
}

#[async_trait]
impl<S: EvaluationStrategy> PipelineStep for EvaluationStep<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &StepOptions {
        &self.options
    }

    async fn validate_input(&self, context: &ProcessingContext) -> bool {
        context.data().height() > 0
    }

    async fn execute(&self, context: &mut ProcessingContext) -> Result<StepResult, StepError> {
        for reference in self.strategy.required_references() {
            if !context.has_auxiliary_data(reference) {
                return Err(StepError::Lookup(format!("reference dataset '{}' is not loaded", reference)));
            }
        }

        let missing = missing_columns(context.data(), &self.strategy.required_columns());
        if !missing.is_empty() {
            return Err(StepError::Validation(format!("missing columns: {}", missing.join(", "))));
        }

        let closing_month = context
            .processing_date()
            .map(i64::from)
            .or_else(|| context.get_int("processing_date"))
            .ok_or_else(|| StepError::Validation("processing date is unknown".to_string()))?;

        let status_column = context.status_column();
        let mut frame = context.data().clone();
        let rows = frame.height();
        frame.with_column(Series::new(FILE_DATE.into(), vec![closing_month; rows]))?;

        let mut assignment = match text_column(&frame, status_column)? {
            Some(existing) => StatusAssignment::from_existing(existing),
            None => StatusAssignment::unset(rows),
        };

        let conditions = self.strategy.build_conditions(&frame, context)?;
        let input = ConditionInput {
            frame: &frame,
            processing_type: context.processing_type(),
            closing_month,
            conditions: &conditions,
        };
        let hits = self.strategy.apply_status(&self.engine, &input, &mut assignment)?;
        let format_errors = self.apply_range_policy(&frame, &mut assignment)?;

        let flags = accrual_flags(&assignment.statuses);
        let flag_values = flags
            .iter()
            .map(|f| Some(if *f { "Y" } else { "N" }.to_string()))
            .collect();

        let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
        for status in assignment.statuses.iter().flatten() {
            *distribution.entry(status.clone()).or_default() += 1;
        }
        let unset = assignment.unset_count();
        let accrual_count = flags.iter().filter(|f| **f).count();

        set_text_column(&mut frame, status_column, assignment.statuses)?;
        set_text_column(&mut frame, MATCHED_CONDITION, assignment.notes)?;
        set_text_column(&mut frame, ACCRUAL_FLAG, flag_values)?;
        self.strategy.set_accounting_fields(&mut frame, &flags, context)?;

        info!(
            "{}: {} rows evaluated, {} flagged for accrual, {} without status",
            self.name, rows, accrual_count, unset
        );
        context.update_data(frame);

        Ok(
            StepResult::success(&self.name, format!("{} of {} rows flagged for accrual", accrual_count, rows))
                .with_metadata("total_count", rows)
                .with_metadata("accrual_count", accrual_count)
                .with_metadata("unset_count", unset)
                .with_metadata("format_error_count", format_errors)
                .with_metadata("status_distribution", json!(distribution))
                .with_metadata("rule_hits", json!(hits)),
        )
    }
}
