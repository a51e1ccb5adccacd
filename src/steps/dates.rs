//! Date logic step - ERM conversion and description date ranges

use crate::core::columns::{DEFAULT_DATE_RANGE, DESCRIPTION_RANGE, ERM_YYYYMM, EXPECTED_RECEIVE_MONTH, ITEM_DESCRIPTION};
use crate::core::config::DatePatterns;
use crate::core::frame::{set_text_column, text_column};
use crate::core::{PipelineStep, ProcessingContext, StepError, StepOptions, StepResult};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

/// `Mon-YY` to YYYYMM; 0 when unparseable
pub fn erm_to_yyyymm(value: Option<&str>) -> i64 {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return 0;
    };
    NaiveDate::parse_from_str(&format!("01-{}", value), "%d-%b-%y")
        .map(|date| date.year() as i64 * 100 + date.month() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    RangeWithDay,
    RangeOfMonths,
    SingleDay,
    SingleMonth,
}

/// Compiled description patterns, most specific first
#[derive(Debug, Clone)]
pub struct RangeExtractor {
    patterns: Vec<(Shape, Regex)>,
}

impl RangeExtractor {
    pub fn new(patterns: &DatePatterns) -> Result<Self, StepError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| StepError::RuleConfiguration(format!("invalid date pattern '{}': {}", pattern, e)))
        };
        Ok(Self {
            patterns: vec![
                (Shape::RangeWithDay, compile(&patterns.ymd_to_ymd)?),
                (Shape::RangeOfMonths, compile(&patterns.ym_to_ym)?),
                (Shape::SingleDay, compile(&patterns.ymd)?),
                (Shape::SingleMonth, compile(&patterns.ym)?),
            ],
        })
    }

    /// `YYYYMM,YYYYMM` for a description, or `None` when no pattern yields valid dates
    pub fn extract(&self, description: &str) -> Option<String> {
        let description = description.trim();
        if description.is_empty() {
            return None;
        }

        for (shape, regex) in &self.patterns {
            let Some(caps) = regex.captures(description) else {
                continue;
            };
            let with_day = matches!(shape, Shape::RangeWithDay | Shape::SingleDay);
            let start = caps.get(1).and_then(|m| to_yyyymm(m.as_str(), with_day));
            let end = match shape {
                Shape::RangeWithDay | Shape::RangeOfMonths => {
                    caps.get(2).and_then(|m| to_yyyymm(m.as_str(), with_day))
                }
                Shape::SingleDay | Shape::SingleMonth => start,
            };
            match (start, end) {
                (Some(start), Some(end)) => return Some(format!("{},{}", start, end)),
                _ => debug!("Invalid dates for {:?} in '{}'", shape, description),
            }
        }
        None
    }
}

/// `YYYY/MM[/DD]` to YYYYMM after range checks
fn to_yyyymm(value: &str, with_day: bool) -> Option<i64> {
    let parts: Vec<&str> = value.split('/').collect();
    let expected = if with_day { 3 } else { 2 };
    if parts.len() != expected {
        return None;
    }

    let year: i64 = parts[0].parse().ok()?;
    let month: i64 = parts[1].parse().ok()?;
    if !(1900..=9999).contains(&year) || !(1..=12).contains(&month) {
        return None;
    }
    if with_day {
        let day: i64 = parts[2].parse().ok()?;
        if !(1..=31).contains(&day) {
            return None;
        }
    }
    Some(year * 100 + month)
}

/// Adds the ERM and description-range columns used by the rules
pub struct DateLogicStep {
    name: String,
    extractor: RangeExtractor,
    options: StepOptions,
}

impl DateLogicStep {
    pub fn new(name: impl Into<String>, patterns: &DatePatterns) -> Result<Self, StepError> {
        Ok(Self {
            name: name.into(),
            extractor: RangeExtractor::new(patterns)?,
            options: StepOptions::default(),
        })
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl PipelineStep for DateLogicStep {
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
        let mut frame = context.data().clone();
        let mut unparseable = 0;

        match text_column(&frame, EXPECTED_RECEIVE_MONTH)? {
            Some(values) => {
                let erm: Vec<i64> = values.iter().map(|v| erm_to_yyyymm(v.as_deref())).collect();
                frame.with_column(Series::new(ERM_YYYYMM.into(), erm))?;
            }
            None => warn!("Column '{}' missing, ERM not converted", EXPECTED_RECEIVE_MONTH),
        }

        match text_column(&frame, ITEM_DESCRIPTION)? {
            Some(values) => {
                let ranges = values
                    .iter()
                    .map(|v| {
                        let range = v.as_deref().and_then(|d| self.extractor.extract(d));
                        if range.is_none() {
                            unparseable += 1;
                        }
                        Some(range.unwrap_or_else(|| DEFAULT_DATE_RANGE.to_string()))
                    })
                    .collect();
                set_text_column(&mut frame, DESCRIPTION_RANGE, ranges)?;
            }
            None => warn!("Column '{}' missing, date ranges not extracted", ITEM_DESCRIPTION),
        }

        if unparseable > 0 {
            warn!("{} descriptions without a parseable date range", unparseable);
        }
        info!("Date logic applied to {} rows", frame.height());

        let rows = frame.height();
        context.update_data(frame);
        Ok(StepResult::success(&self.name, format!("Dates derived for {} rows", rows))
            .with_metadata("unparseable_ranges", unparseable))
    }
}
