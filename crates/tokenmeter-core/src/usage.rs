//! Usage events as they are written to the event log

use serde::{Deserialize, Serialize};

/// Token counts reported by a provider for a single request.
///
/// Every counter is optional because providers report different subsets.
/// When `total` is absent it is derived from the other four.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl TokenUsage {
    /// Build a usage record from input/output counts only
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
            ..Default::default()
        }
    }

    pub fn with_cache(mut self, cache_read: u64, cache_write: u64) -> Self {
        self.cache_read = Some(cache_read);
        self.cache_write = Some(cache_write);
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Sum of the four component counters, missing values counted as zero
    pub fn component_sum(&self) -> u64 {
        [self.input, self.output, self.cache_read, self.cache_write]
            .into_iter()
            .flatten()
            .fold(0u64, u64::saturating_add)
    }

    /// Reported total, or the component sum when the provider did not report one
    pub fn effective_total(&self) -> u64 {
        self.total.unwrap_or_else(|| self.component_sum())
    }
}

/// A single recorded request against a model provider.
///
/// Events are immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Milliseconds since the Unix epoch, assigned at write time
    pub timestamp: i64,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,

    /// Estimated cost in USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Predicate applied to events while reading the log.
///
/// Also identifies the query a summary was generated for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Inclusive lower bound (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,

    /// Inclusive upper bound (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl EventFilter {
    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn matches(&self, event: &UsageEvent) -> bool {
        if self.since.is_some_and(|since| event.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.timestamp > until) {
            return false;
        }
        if self.provider.as_deref().is_some_and(|p| p != event.provider) {
            return false;
        }
        if self.model.as_deref().is_some_and(|m| m != event.model) {
            return false;
        }
        true
    }
}
