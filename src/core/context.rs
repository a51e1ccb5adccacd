//! Per-run data carrier

use crate::core::{ProcessingType, StepResult};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identity of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// Business entity, e.g. SPT or SPX
    pub entity_type: String,

    pub processing_type: ProcessingType,

    /// Closing month as YYYYMM; filled by loading when the caller leaves it unset
    pub processing_date: Option<u32>,
}

/// Mutable state threaded through every step of one run
///
/// Owned by exactly one in-flight run, so there is no internal locking.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub metadata: ContextMetadata,
    data: DataFrame,
    auxiliary: BTreeMap<String, DataFrame>,
    variables: BTreeMap<String, Value>,
    history: Vec<StepResult>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ProcessingContext {
    pub fn new(entity_type: impl Into<String>, processing_type: ProcessingType) -> Self {
        Self::from_metadata(ContextMetadata {
            entity_type: entity_type.into(),
            processing_type,
            processing_date: None,
        })
    }

    pub fn from_metadata(metadata: ContextMetadata) -> Self {
        Self {
            metadata,
            data: DataFrame::empty(),
            auxiliary: BTreeMap::new(),
            variables: BTreeMap::new(),
            history: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Set an explicit processing date (YYYYMM)
    pub fn with_processing_date(mut self, date: u32) -> Self {
        self.metadata.processing_date = Some(date);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.metadata.entity_type
    }

    pub fn processing_type(&self) -> ProcessingType {
        self.metadata.processing_type
    }

    pub fn processing_date(&self) -> Option<u32> {
        self.metadata.processing_date
    }

    /// Primary dataset
    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    /// Replace the primary dataset
    pub fn update_data(&mut self, data: DataFrame) {
        self.data = data;
    }

    /// Insert or overwrite an auxiliary dataset
    pub fn add_auxiliary_data(&mut self, name: impl Into<String>, data: DataFrame) {
        self.auxiliary.insert(name.into(), data);
    }

    pub fn get_auxiliary_data(&self, name: &str) -> Option<&DataFrame> {
        self.auxiliary.get(name)
    }

    pub fn has_auxiliary_data(&self, name: &str) -> bool {
        self.auxiliary.contains_key(name)
    }

    pub fn remove_auxiliary_data(&mut self, name: &str) -> Option<DataFrame> {
        self.auxiliary.remove(name)
    }

    /// Auxiliary dataset names in sorted order
    pub fn auxiliary_names(&self) -> Vec<String> {
        self.auxiliary.keys().cloned().collect()
    }

    pub fn auxiliary_data(&self) -> impl Iterator<Item = (&String, &DataFrame)> {
        self.auxiliary.iter()
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Variable value or the supplied default
    pub fn get_variable_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.variables.get(key).cloned().unwrap_or_else(|| default.into())
    }

    /// Integer variable, accepting numeric strings
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.variables.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Append a result to the execution history
    pub fn record_result(&mut self, result: StepResult) {
        self.history.push(result);
    }

    pub fn history(&self) -> &[StepResult] {
        &self.history
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Status column for the run's processing type
    pub fn status_column(&self) -> &'static str {
        self.metadata.processing_type.status_column()
    }

    /// Document number column for the run's processing type
    pub fn id_column(&self) -> &'static str {
        self.metadata.processing_type.id_column()
    }

    /// Rebuild a context from persisted parts
    pub(crate) fn restore(
        metadata: ContextMetadata,
        data: DataFrame,
        auxiliary: BTreeMap<String, DataFrame>,
        variables: BTreeMap<String, Value>,
        history: Vec<StepResult>,
    ) -> Self {
        Self {
            metadata,
            data,
            auxiliary,
            variables,
            history,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
