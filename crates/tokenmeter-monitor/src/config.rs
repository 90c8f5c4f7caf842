//! Token monitor configuration

use crate::cache::DEFAULT_CACHE_TTL_MS;
use crate::retention::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokenmeter_core::{AlertThresholds, Error, LimitsConfig, PricingTable, Result};

/// Event log file name inside the data directory
pub const LOG_FILE_NAME: &str = "token-monitor.jsonl";

/// Persisted summary file name inside the data directory
pub const SUMMARY_FILE_NAME: &str = "token-monitor-summary.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Record usage at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding the event log and the persisted summary (`~` is expanded)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Summary cache freshness window (milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsConfig>,

    #[serde(default)]
    pub alert_thresholds: AlertThresholds,

    /// Per-model rates keyed by `provider/model` or `model`
    #[serde(default)]
    pub pricing: PricingTable,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionPolicy>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: default_data_dir(),
            cache_ttl_ms: default_cache_ttl_ms(),
            limits: None,
            alert_thresholds: AlertThresholds::default(),
            pricing: PricingTable::default(),
            retention: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> String {
    "~/.tokenmeter".to_string()
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS as u64
}

impl MonitorConfig {
    /// Load from a `.toml` file, or YAML for any other extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("TOKENMETER_ENABLED") {
            match val.parse::<bool>() {
                Ok(enabled) => self.enabled = enabled,
                Err(_) => tracing::warn!(value = %val, "Ignoring invalid TOKENMETER_ENABLED"),
            }
        }

        if let Ok(val) = std::env::var("TOKENMETER_DATA_DIR") {
            self.data_dir = val;
        }

        if let Ok(val) = std::env::var("TOKENMETER_CACHE_TTL_MS") {
            match val.parse::<u64>() {
                Ok(ttl) => self.cache_ttl_ms = ttl,
                Err(_) => tracing::warn!(value = %val, "Ignoring invalid TOKENMETER_CACHE_TTL_MS"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_ms == 0 {
            return Err(Error::ConfigValidation("cacheTtlMs must be at least 1".to_string()));
        }
        if self.cache_ttl_ms > i64::MAX as u64 {
            return Err(Error::ConfigValidation("cacheTtlMs is too large".to_string()));
        }

        let alerts = &self.alert_thresholds;
        if alerts.warning < 0.0 || alerts.critical < 0.0 {
            return Err(Error::ConfigValidation(
                "alert thresholds must not be negative".to_string(),
            ));
        }
        if alerts.warning >= alerts.critical || alerts.critical > 100.0 {
            return Err(Error::ConfigValidation(
                "alert thresholds must satisfy warning < critical <= 100".to_string(),
            ));
        }

        if let Some(limits) = &self.limits {
            for (window, threshold) in limits.windows() {
                if threshold.max_cost.is_some_and(|c| c < 0.0) {
                    return Err(Error::ConfigValidation(format!(
                        "{} maxCost must not be negative",
                        window
                    )));
                }
            }
        }

        for (key, rates) in &self.pricing.models {
            if rates.input < 0.0 || rates.output < 0.0 || rates.cache_read < 0.0 || rates.cache_write < 0.0 {
                return Err(Error::ConfigValidation(format!(
                    "pricing for {} must not be negative",
                    key
                )));
            }
        }

        if let Some(retention) = &self.retention {
            retention.validate().map_err(Error::ConfigValidation)?;
        }

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join(LOG_FILE_NAME)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.data_dir().join(SUMMARY_FILE_NAME)
    }

    pub fn cache_ttl(&self) -> i64 {
        self.cache_ttl_ms as i64
    }
}
