//! Workpaper integration - merge remarks from auxiliary workpapers into the primary dataset
//!
//! A workpaper is an auxiliary dataset keyed by `PO Line` or `PR Line`. The
//! generic [`IntegrationStep`] joins each loaded workpaper on its key; an
//! [`IntegrationStrategy`] names the workpapers, the columns taken from them
//! and any clean-up after the join.

use crate::core::columns::{
    MEMO, NOTED_PROCUREMENT, NOTED_PROCUREMENT_PR, PO_LINE, PR_LINE, REMARK_PREVIOUS_FN, REMARK_PREVIOUS_FN_PR,
    REMARK_PREVIOUS_PROCUREMENT, REMARK_PROCUREMENT, REMARK_PROCUREMENT_PR,
};
use crate::core::frame::{has_column, set_text_column, text_column};
use crate::core::{PipelineStep, ProcessingContext, ProcessingType, StepError, StepOptions, StepResult};
use async_trait::async_trait;
use polars::prelude::*;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// One column copied from a workpaper
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    /// Accepted source names, first present wins
    pub sources: &'static [&'static str],
    pub target: &'static str,
}

/// An auxiliary dataset merged on a line key
#[derive(Debug, Clone, Copy)]
pub struct WorkpaperSource {
    /// Auxiliary dataset name, i.e. the file key it was loaded under
    pub dataset: &'static str,
    /// Key column of the primary dataset
    pub key: &'static str,
    /// Accepted key column names in the workpaper
    pub key_aliases: &'static [&'static str],
    pub fields: &'static [FieldMapping],
}

/// Entity-specific hooks of the integration step
pub trait IntegrationStrategy: Send + Sync {
    fn sources(&self) -> &[WorkpaperSource];

    /// Post-join adjustments
    fn finish(&self, _frame: &mut DataFrame, _processing_type: ProcessingType) -> Result<(), StepError> {
        Ok(())
    }
}

/// Generic workpaper integration driver
pub struct IntegrationStep<S> {
    name: String,
    strategy: S,
    options: StepOptions,
}

impl<S: IntegrationStrategy> IntegrationStep<S> {
    pub fn new(name: impl Into<String>, strategy: S) -> Self {
        Self {
            name: name.into(),
            strategy,
            options: StepOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }
}

/// Workpaper key -> value, later rows overriding earlier ones
fn lookup_table(
    workpaper: &DataFrame,
    key_column: &str,
    value_column: &str,
) -> Result<HashMap<String, Option<String>>, StepError> {
    let keys = text_column(workpaper, key_column)?.unwrap_or_default();
    let values = text_column(workpaper, value_column)?.unwrap_or_default();
    Ok(keys
        .into_iter()
        .zip(values)
        .filter_map(|(key, value)| Some((key?.trim().to_string(), value)))
        .collect())
}

fn first_present<'a>(frame: &DataFrame, names: &[&'a str]) -> Option<&'a str> {
    names.iter().copied().find(|name| has_column(frame, name))
}

/// Join one workpaper into `frame`; returns the number of matched rows
fn merge_workpaper(frame: &mut DataFrame, workpaper: &DataFrame, source: &WorkpaperSource) -> Result<usize, StepError> {
    let Some(keys) = text_column(frame, source.key)? else {
        debug!("Primary data has no '{}', skipping {}", source.key, source.dataset);
        return Ok(0);
    };
    let Some(workpaper_key) = first_present(workpaper, source.key_aliases) else {
        debug!("Workpaper {} has no key column, skipping", source.dataset);
        return Ok(0);
    };

    let mut matched = vec![false; keys.len()];
    for field in source.fields {
        let Some(column) = first_present(workpaper, field.sources) else {
            debug!("Workpaper {} has no {:?}", source.dataset, field.sources);
            continue;
        };
        let table = lookup_table(workpaper, workpaper_key, column)?;
        let values = keys
            .iter()
            .enumerate()
            .map(|(row, key)| {
                let hit = key.as_deref().and_then(|k| table.get(k.trim()));
                matched[row] |= hit.is_some();
                hit.cloned().flatten()
            })
            .collect();
        set_text_column(frame, field.target, values)?;
    }
    Ok(matched.iter().filter(|m| **m).count())
}

/// Overwrite `target` with `source` when `source` exists
fn copy_column(frame: &mut DataFrame, source: &str, target: &str) -> Result<(), StepError> {
    if let Some(values) = text_column(frame, source)? {
        set_text_column(frame, target, values)?;
    }
    Ok(())
}

#[async_trait]
impl<S: IntegrationStrategy> PipelineStep for IntegrationStep<S> {
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
        let available: Vec<&WorkpaperSource> = self
            .strategy
            .sources()
            .iter()
            .filter(|source| context.has_auxiliary_data(source.dataset))
            .collect();
        if available.is_empty() {
            let names: Vec<_> = self.strategy.sources().iter().map(|s| s.dataset).collect();
            return Err(StepError::Lookup(names.join(" or ")));
        }

        let mut frame = context.data().clone();
        let mut matched = BTreeMap::new();
        for source in available {
            if let Some(workpaper) = context.get_auxiliary_data(source.dataset) {
                let rows = merge_workpaper(&mut frame, workpaper, source)?;
                info!("{}: {} rows matched in {}", self.name, rows, source.dataset);
                matched.insert(source.dataset.to_string(), rows);
            }
        }
        self.strategy.finish(&mut frame, context.processing_type())?;
        context.update_data(frame);

        let total: usize = matched.values().sum();
        Ok(
            StepResult::success(&self.name, format!("Integrated {} workpaper(s), {} rows matched", matched.len(), total))
                .with_metadata("matched_rows", json!(matched)),
        )
    }
}

const FN_REMARK: &[&str] = &["Remarked by FN", "remarked_by_fn"];
const PROCUREMENT_REMARK: &[&str] = &["Remarked by Procurement", "remarked_by_procurement"];
const PROCUREMENT_NOTE: &[&str] = &["Noted by Procurement", "noted_by_procurement"];
const PO_KEYS: &[&str] = &[PO_LINE, "po_line"];
const PR_KEYS: &[&str] = &[PR_LINE, "pr_line"];

/// Last month's closing workpapers (`previous`, `previous_pr`)
#[derive(Debug, Default, Clone, Copy)]
pub struct PreviousWorkpaper;

const PREVIOUS_SOURCES: &[WorkpaperSource] = &[
    WorkpaperSource {
        dataset: "previous",
        key: PO_LINE,
        key_aliases: PO_KEYS,
        fields: &[
            FieldMapping { sources: FN_REMARK, target: REMARK_PREVIOUS_FN },
            FieldMapping { sources: PROCUREMENT_REMARK, target: REMARK_PREVIOUS_PROCUREMENT },
            FieldMapping { sources: &[MEMO], target: MEMO },
        ],
    },
    WorkpaperSource {
        dataset: "previous_pr",
        key: PR_LINE,
        key_aliases: PR_KEYS,
        fields: &[FieldMapping { sources: FN_REMARK, target: REMARK_PREVIOUS_FN_PR }],
    },
];

impl IntegrationStrategy for PreviousWorkpaper {
    fn sources(&self) -> &[WorkpaperSource] {
        PREVIOUS_SOURCES
    }

    fn finish(&self, frame: &mut DataFrame, processing_type: ProcessingType) -> Result<(), StepError> {
        if processing_type == ProcessingType::Pr {
            copy_column(frame, REMARK_PREVIOUS_FN_PR, REMARK_PREVIOUS_FN)?;
        }
        Ok(())
    }
}

/// Procurement team workpapers (`procurement_po`, `procurement_pr`)
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcurementWorkpaper;

const PROCUREMENT_SOURCES: &[WorkpaperSource] = &[
    WorkpaperSource {
        dataset: "procurement_po",
        key: PO_LINE,
        key_aliases: PO_KEYS,
        fields: &[
            FieldMapping { sources: PROCUREMENT_REMARK, target: REMARK_PROCUREMENT },
            FieldMapping { sources: PROCUREMENT_NOTE, target: NOTED_PROCUREMENT },
        ],
    },
    WorkpaperSource {
        dataset: "procurement_pr",
        key: PR_LINE,
        key_aliases: PR_KEYS,
        fields: &[
            FieldMapping { sources: PROCUREMENT_REMARK, target: REMARK_PROCUREMENT_PR },
            FieldMapping { sources: PROCUREMENT_NOTE, target: NOTED_PROCUREMENT_PR },
        ],
    },
];

impl IntegrationStrategy for ProcurementWorkpaper {
    fn sources(&self) -> &[WorkpaperSource] {
        PROCUREMENT_SOURCES
    }

    /// PR runs read the PR remarks under the plain column names
    fn finish(&self, frame: &mut DataFrame, processing_type: ProcessingType) -> Result<(), StepError> {
        if processing_type == ProcessingType::Pr {
            copy_column(frame, REMARK_PROCUREMENT_PR, REMARK_PROCUREMENT)?;
            copy_column(frame, NOTED_PROCUREMENT_PR, NOTED_PROCUREMENT)?;
        }
        Ok(())
    }
}
