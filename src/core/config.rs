//! Application configuration from YAML

use crate::core::condition::{ConditionEngine, RuleConfig};
use crate::core::{ProcessingType, StepOptions};
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, passed explicitly to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: Defaults,

    /// Per step-name overrides
    #[serde(default)]
    pub steps: BTreeMap<String, StepOverride>,

    /// Entity -> ordered step names per processing type
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineLists>,

    #[serde(default)]
    pub entities: BTreeMap<String, EntityProfile>,

    /// Rule-set key -> decision table
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<RuleConfig>>,

    #[serde(default)]
    pub date_patterns: DatePatterns,

    #[serde(default)]
    pub unparseable_date_range: UnparseableRangePolicy,

    #[serde(default)]
    pub checkpoint: CheckpointSettings,

    /// Directory for exported results
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            steps: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            entities: BTreeMap::new(),
            rules: BTreeMap::new(),
            date_patterns: DatePatterns::default(),
            unparseable_date_range: UnparseableRangePolicy::default(),
            checkpoint: CheckpointSettings::default(),
            output_dir: default_output_dir(),
        }
    }
}

/// Global step defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,

    /// Size of the shared read pool
    #[serde(default = "default_concurrency")]
    pub max_concurrent_reads: usize,

    #[serde(default = "default_true")]
    pub stop_on_error: bool,
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            retry_count: 0,
            timeout_secs: None,
            backoff_base_ms: default_backoff_ms(),
            max_concurrent_reads: default_concurrency(),
            stop_on_error: true,
        }
    }
}

/// Overrides for one step name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOverride {
    #[serde(default)]
    pub required: Option<bool>,

    #[serde(default)]
    pub retry_count: Option<u32>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Ordered step names for each processing type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineLists {
    #[serde(default)]
    pub po: Vec<String>,

    #[serde(default)]
    pub pr: Vec<String>,
}

impl PipelineLists {
    pub fn for_type(&self, processing_type: ProcessingType) -> &[String] {
        match processing_type {
            ProcessingType::Po => &self.po,
            ProcessingType::Pr => &self.pr,
        }
    }
}

/// Entity-specific settings consumed by the strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityProfile {
    /// Account mapping file holding Account, Account Desc and Liability
    #[serde(default)]
    pub reference_mapping: Option<PathBuf>,

    /// Fixed-asset GL accounts
    #[serde(default)]
    pub fa_accounts: Vec<String>,

    /// Accounts whose department code is kept
    #[serde(default)]
    pub dept_accounts: Vec<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Liability account used for prepaid lines
    #[serde(default = "default_prepayment_liability")]
    pub prepayment_liability: String,

    /// Key into `rules`; the built-in ERM table is used when unset
    #[serde(default)]
    pub rule_set: Option<String>,
}

fn default_region() -> String {
    "TW".to_string()
}

fn default_prepayment_liability() -> String {
    "111112".to_string()
}

impl Default for EntityProfile {
    fn default() -> Self {
        Self {
            reference_mapping: None,
            fa_accounts: Vec::new(),
            dept_accounts: Vec::new(),
            region: default_region(),
            prepayment_liability: default_prepayment_liability(),
            rule_set: None,
        }
    }
}

/// Description date-range patterns, tried most specific first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatePatterns {
    #[serde(default = "default_ymd_to_ymd")]
    pub ymd_to_ymd: String,

    #[serde(default = "default_ym_to_ym")]
    pub ym_to_ym: String,

    #[serde(default = "default_ymd")]
    pub ymd: String,

    #[serde(default = "default_ym")]
    pub ym: String,
}

fn default_ymd_to_ymd() -> String {
    r"(\d{4}/\d{1,2}/\d{1,2})\s*[-~]\s*(\d{4}/\d{1,2}/\d{1,2})".to_string()
}

fn default_ym_to_ym() -> String {
    r"(\d{4}/\d{1,2})\s*[-~]\s*(\d{4}/\d{1,2})".to_string()
}

fn default_ymd() -> String {
    r"(\d{4}/\d{1,2}/\d{1,2})".to_string()
}

fn default_ym() -> String {
    r"(\d{4}/\d{1,2})".to_string()
}

impl Default for DatePatterns {
    fn default() -> Self {
        Self {
            ymd_to_ymd: default_ymd_to_ymd(),
            ym_to_ym: default_ym_to_ym(),
            ymd: default_ymd(),
            ym: default_ym(),
        }
    }
}

/// What to do with descriptions whose date range cannot be parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparseableRangePolicy {
    /// Rows left unset by the rules get the format-error status
    #[default]
    FormatError,
    /// Rows stay without status
    LeaveUnset,
    /// The evaluation step fails
    Reject,
}

/// Checkpointing after successful steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_checkpoint_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.defaults.max_concurrent_reads == 0 {
            bail!("defaults.max_concurrent_reads must be at least 1");
        }

        for (entity, lists) in &self.pipelines {
            for processing_type in [ProcessingType::Po, ProcessingType::Pr] {
                let mut seen = HashSet::new();
                for name in lists.for_type(processing_type) {
                    if !seen.insert(name) {
                        bail!(
                            "Duplicate step '{}' in pipelines.{}.{}",
                            name,
                            entity,
                            processing_type.as_str().to_lowercase()
                        );
                    }
                }
            }
        }

        for (key, rules) in &self.rules {
            ConditionEngine::new(rules).with_context(|| format!("Rule set '{}' is invalid", key))?;
        }

        for (entity, profile) in &self.entities {
            if let Some(rule_set) = &profile.rule_set {
                if !self.rules.contains_key(rule_set) {
                    bail!("Entity '{}' references unknown rule set '{}'", entity, rule_set);
                }
            }
        }

        for pattern in [
            &self.date_patterns.ymd_to_ymd,
            &self.date_patterns.ym_to_ym,
            &self.date_patterns.ymd,
            &self.date_patterns.ym,
        ] {
            Regex::new(pattern).with_context(|| format!("Invalid date pattern '{}'", pattern))?;
        }

        Ok(())
    }

    /// Configured step names for an entity; empty when none are configured
    pub fn configured_steps(&self, entity: &str, processing_type: ProcessingType) -> &[String] {
        lookup(&self.pipelines, entity)
            .map(|lists| lists.for_type(processing_type))
            .unwrap_or(&[])
    }

    /// Profile for an entity, falling back to defaults
    pub fn entity_profile(&self, entity: &str) -> EntityProfile {
        lookup(&self.entities, entity).cloned().unwrap_or_default()
    }

    /// Decision table configured for an entity, if any
    pub fn rules_for(&self, entity: &str) -> Option<&[RuleConfig]> {
        let profile = lookup(&self.entities, entity)?;
        let key = profile.rule_set.as_ref()?;
        self.rules.get(key).map(Vec::as_slice)
    }

    /// Effective options for a step name
    pub fn step_options(&self, step_name: &str, required: bool) -> StepOptions {
        let overrides = self.steps.get(step_name).cloned().unwrap_or_default();
        StepOptions {
            required: overrides.required.unwrap_or(required),
            retry_count: overrides.retry_count.unwrap_or(self.defaults.retry_count),
            timeout: overrides
                .timeout_secs
                .or(self.defaults.timeout_secs)
                .map(Duration::from_secs),
            backoff_base: Duration::from_millis(self.defaults.backoff_base_ms),
        }
    }
}

/// Case-insensitive entity lookup
fn lookup<'a, T>(map: &'a BTreeMap<String, T>, entity: &str) -> Option<&'a T> {
    map.get(entity).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(entity))
            .map(|(_, value)| value)
    })
}
