//! Configuration for inventory searches.
//!
//! Loaded once at startup from a YAML file listing the sources to inventory
//! (`obs_inventory_search`) and the engine settings that govern retries and
//! concurrency.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{InventoryError, Result};
use crate::hpss::ClientConfig;

/// Root configuration loaded from an inventory YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationsConfig {
    /// Date range used by sources that do not set their own.
    #[serde(default)]
    pub search_date_range: Option<DateRangeConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    pub obs_inventory_search: Vec<SourceConfig>,
}

/// Start and end days as written in the config (`2020-01-01` or RFC 3339).
#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeConfig {
    pub start: String,
    /// Open-ended when absent: the search runs through today.
    #[serde(default)]
    pub end: Option<String>,
}

/// Format-specific count command run on the inventoried files downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NceplibsCommand {
    Sinv,
    Cmpbqm,
}

impl NceplibsCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sinv => "sinv",
            Self::Cmpbqm => "cmpbqm",
        }
    }
}

/// What to do with a day that cannot be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and move on to the next day.
    Skip,
    /// Stop searching the source.
    Halt,
}

/// One source as written in the config.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub key: String,
    pub obs_name: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// strftime template of the tarball path for a day.
    pub hpss_path: String,
    /// Seconds between observation cycles.
    #[serde(default)]
    pub cycling_interval: Option<u64>,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub s3_prefix: Option<String>,
    #[serde(default)]
    pub nceplibs_cmd: Option<NceplibsCommand>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_platform() -> String {
    "hera_hpss".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Settings for the search engine and archive client.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Size of the worker pool issuing archive commands.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Attempts allowed against one day before the retry budget is spent.
    #[serde(default = "default_max_attempts_per_day")]
    pub max_attempts_per_day: u32,
    /// Exit codes treated as transient archive conditions.
    #[serde(default = "default_transient_codes")]
    pub transient_codes: Vec<i32>,
    #[serde(default = "default_failure_policy")]
    pub on_permanent_failure: FailurePolicy,
    #[serde(default = "default_failure_policy")]
    pub on_retries_exhausted: FailurePolicy,
    /// Pause before the next round when a round made no progress at all.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_command_timeout_secs() -> u64 {
    600 // 10 minutes, tape recalls are slow
}

fn default_max_attempts_per_day() -> u32 {
    5
}

/// EAGAIN, EBUSY, and htar's "HPSS transfer failed" exit status.
pub fn default_transient_codes() -> Vec<i32> {
    vec![11, 16, 72]
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Skip
}

fn default_retry_delay_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            command_timeout_secs: default_command_timeout_secs(),
            max_attempts_per_day: default_max_attempts_per_day(),
            transient_codes: default_transient_codes(),
            on_permanent_failure: default_failure_policy(),
            on_retries_exhausted: default_failure_policy(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl EngineConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.command_timeout_secs),
            transient_codes: self.transient_codes.iter().copied().collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(InventoryError::InvalidConfig(
                "engine.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.max_attempts_per_day == 0 {
            return Err(InventoryError::InvalidConfig(
                "engine.max_attempts_per_day must be at least 1".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(InventoryError::InvalidConfig(
                "engine.command_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fully resolved search source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub key: String,
    pub obs_name: String,
    pub platform: String,
    pub hpss_path: String,
    pub cycling_interval: Option<u64>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub nceplibs_cmd: Option<NceplibsCommand>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SearchConfig {
    /// Create a search source with default metadata.
    pub fn new(
        key: impl Into<String>,
        hpss_path: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        let key = key.into();
        let hpss_path = hpss_path.into();
        validate_path_template(&key, &hpss_path)?;

        Ok(Self {
            obs_name: key.clone(),
            key,
            platform: default_platform(),
            hpss_path,
            cycling_interval: None,
            s3_bucket: None,
            s3_prefix: None,
            nceplibs_cmd: None,
            start,
            end,
        })
    }

    /// The tarball path searched for `day`.
    pub fn search_path(&self, day: DateTime<Utc>) -> String {
        let mut path = String::new();
        if write!(path, "{}", day.format(&self.hpss_path)).is_err() {
            // templates are validated on construction
            return self.hpss_path.clone();
        }
        path
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        key: &str,
        hpss_path: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self::new(key, hpss_path, start, end).unwrap()
    }
}

fn validate_path_template(key: &str, template: &str) -> Result<()> {
    let invalid = template.trim().is_empty()
        || StrftimeItems::new(template).any(|item| matches!(item, Item::Error));
    if invalid {
        return Err(InventoryError::InvalidPathTemplate {
            source_key: key.to_string(),
            template: template.to_string(),
        });
    }
    Ok(())
}

/// Parse a day given as `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_day(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    // timestamps are truncated to their UTC day so the cursor lands on midnight
    let date = match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Some(dt.with_timezone(&Utc).date_naive()),
        Err(_) => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
    };
    date.and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| InventoryError::InvalidConfig(format!("Invalid date: '{}'", value)))
}

fn today() -> DateTime<Utc> {
    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    Utc.from_utc_datetime(&midnight)
}

impl ObservationsConfig {
    /// Load an inventory configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), sources = config.obs_inventory_search.len(), "Loaded inventory config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Invalid inventory YAML")?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Resolve every enabled source into a search configuration.
    pub fn search_configs(&self) -> Result<Vec<SearchConfig>> {
        let default_start = self
            .search_date_range
            .as_ref()
            .map(|range| parse_day(&range.start))
            .transpose()?;
        let default_end = self
            .search_date_range
            .as_ref()
            .and_then(|range| range.end.as_deref())
            .map(parse_day)
            .transpose()?;

        let mut seen = HashSet::new();
        let mut configs = Vec::new();

        for source in &self.obs_inventory_search {
            if !source.enabled {
                debug!(source = %source.key, "Skipping disabled source");
                continue;
            }
            if !seen.insert(source.key.as_str()) {
                return Err(InventoryError::InvalidConfig(format!(
                    "Duplicate source key: {}",
                    source.key
                )));
            }

            let start = match source.start.as_deref() {
                Some(start) => parse_day(start)?,
                None => default_start.ok_or_else(|| {
                    InventoryError::InvalidConfig(format!(
                        "Source '{}' has no start date and no search_date_range is set",
                        source.key
                    ))
                })?,
            };
            let end = match source.end.as_deref() {
                Some(end) => parse_day(end)?,
                None => default_end.unwrap_or_else(today),
            };
            if start > end {
                return Err(InventoryError::InvalidConfig(format!(
                    "Source '{}' starts ({}) after it ends ({})",
                    source.key, start, end
                )));
            }

            let mut config = SearchConfig::new(source.key.clone(), source.hpss_path.clone(), start, end)?;
            config.obs_name = source.obs_name.clone();
            config.platform = source.platform.clone();
            config.cycling_interval = source.cycling_interval;
            config.s3_bucket = source.s3_bucket.clone();
            config.s3_prefix = source.s3_prefix.clone();
            config.nceplibs_cmd = source.nceplibs_cmd;

            info!(
                source = %config.key,
                obs_name = %config.obs_name,
                start = %config.start,
                end = %config.end,
                "Resolved search source"
            );
            configs.push(config);
        }

        Ok(configs)
    }
}
