//! Usage limits and the status reported when checking them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ceiling for one window. A threshold of zero is treated as unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitThreshold {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
}

impl LimitThreshold {
    pub fn tokens(max_tokens: u64) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            max_cost: None,
        }
    }

    pub fn cost(max_cost: f64) -> Self {
        Self {
            max_tokens: None,
            max_cost: Some(max_cost),
        }
    }

    /// Token ceiling, if set to something greater than zero
    pub fn active_tokens(&self) -> Option<u64> {
        self.max_tokens.filter(|t| *t > 0)
    }

    /// Cost ceiling, if set to something greater than zero
    pub fn active_cost(&self) -> Option<f64> {
        self.max_cost.filter(|c| *c > 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<LimitThreshold>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<LimitThreshold>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<LimitThreshold>,
}

impl LimitsConfig {
    /// Configured windows in checking priority
    pub fn windows(&self) -> impl Iterator<Item = (LimitWindow, LimitThreshold)> {
        [
            (LimitWindow::Hourly, self.hourly),
            (LimitWindow::Daily, self.daily),
            (LimitWindow::Monthly, self.monthly),
        ]
        .into_iter()
        .filter_map(|(window, threshold)| threshold.map(|t| (window, t)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitWindow {
    Hourly,
    Daily,
    Monthly,
}

impl fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitWindow::Hourly => write!(f, "hourly"),
            LimitWindow::Daily => write!(f, "daily"),
            LimitWindow::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitField {
    Tokens,
    Cost,
}

impl fmt::Display for LimitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitField::Tokens => write!(f, "tokens"),
            LimitField::Cost => write!(f, "cost"),
        }
    }
}

/// Result of a limit check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitStatus {
    pub is_limit_exceeded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_type: Option<LimitWindow>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_field: Option<LimitField>,

    pub current: f64,
    pub limit: f64,
    pub percentage: f64,
}

impl LimitStatus {
    /// Status reported when no configured threshold has been reached
    pub fn within_limits() -> Self {
        Self {
            is_limit_exceeded: false,
            limit_type: None,
            limit_field: None,
            current: 0.0,
            limit: 0.0,
            percentage: 0.0,
        }
    }

    pub fn exceeded(window: LimitWindow, field: LimitField, current: f64, limit: f64) -> Self {
        Self {
            is_limit_exceeded: true,
            limit_type: Some(window),
            limit_field: Some(field),
            current,
            limit,
            percentage: percentage(current, limit),
        }
    }
}

/// Percentages at which a window is reported as approaching its limit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    #[serde(default = "default_warning")]
    pub warning: f64,

    #[serde(default = "default_critical")]
    pub critical: f64,
}

fn default_warning() -> f64 {
    80.0
}

fn default_critical() -> f64 {
    95.0
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warning: default_warning(),
            critical: default_critical(),
        }
    }
}

impl AlertThresholds {
    pub fn level_for(&self, percentage: f64) -> AlertLevel {
        if percentage >= 100.0 {
            AlertLevel::Exceeded
        } else if percentage >= self.critical {
            AlertLevel::Critical
        } else if percentage >= self.warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Ok
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Ok,
    Warning,
    Critical,
    Exceeded,
}

/// Consumption of one configured threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitUsage {
    pub window: LimitWindow,
    pub field: LimitField,
    pub current: f64,
    pub limit: f64,
    pub percentage: f64,
    pub level: AlertLevel,
}

pub fn percentage(current: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        current / limit * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_thresholds_are_inactive() {
        let threshold = LimitThreshold {
            max_tokens: Some(0),
            max_cost: Some(0.0),
        };
        assert_eq!(threshold.active_tokens(), None);
        assert_eq!(threshold.active_cost(), None);
        assert_eq!(LimitThreshold::tokens(5).active_tokens(), Some(5));
    }

    #[test]
    fn test_windows_in_priority_order() {
        let limits = LimitsConfig {
            hourly: None,
            daily: Some(LimitThreshold::tokens(10)),
            monthly: Some(LimitThreshold::cost(1.0)),
        };
        let windows: Vec<LimitWindow> = limits.windows().map(|(w, _)| w).collect();
        assert_eq!(windows, vec![LimitWindow::Daily, LimitWindow::Monthly]);
    }

    #[test]
    fn test_alert_levels() {
        let thresholds = AlertThresholds::default();
        assert_eq!(thresholds.level_for(10.0), AlertLevel::Ok);
        assert_eq!(thresholds.level_for(80.0), AlertLevel::Warning);
        assert_eq!(thresholds.level_for(95.0), AlertLevel::Critical);
        assert_eq!(thresholds.level_for(100.0), AlertLevel::Exceeded);
        assert_eq!(thresholds.level_for(250.0), AlertLevel::Exceeded);
    }

    #[test]
    fn test_limit_status_wire_format() {
        let status = LimitStatus::exceeded(LimitWindow::Hourly, LimitField::Tokens, 150.0, 100.0);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isLimitExceeded"], true);
        assert_eq!(json["limitType"], "hourly");
        assert_eq!(json["limitField"], "tokens");
        assert_eq!(json["percentage"], 150.0);

        let json = serde_json::to_value(LimitStatus::within_limits()).unwrap();
        assert_eq!(json["isLimitExceeded"], false);
        assert!(json.get("limitType").is_none());
    }

    #[test]
    fn test_limits_config_camel_case() {
        let json = r#"{"hourly":{"maxTokens":1000},"monthly":{"maxCost":25.5}}"#;
        let limits: LimitsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(limits.hourly.unwrap().max_tokens, Some(1000));
        assert!(limits.daily.is_none());
        assert_eq!(limits.monthly.unwrap().max_cost, Some(25.5));
    }
}
