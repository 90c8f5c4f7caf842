//! Aggregated usage views built from the event log

use crate::buckets::BucketMap;
use crate::usage::{EventFilter, TokenUsage, UsageEvent};
use serde::{Deserialize, Serialize};

/// Number of entries kept in [`Summary::top_models`]
pub const TOP_MODELS_LIMIT: usize = 10;

/// Running totals for one bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub total: u64,
    pub cost: f64,
    pub request_count: u64,
}

impl Aggregation {
    /// Add one request's counters into this bucket. Counters saturate at `u64::MAX`.
    pub fn fold(&mut self, usage: &TokenUsage, cost: Option<f64>) {
        self.input = self.input.saturating_add(usage.input.unwrap_or(0));
        self.output = self.output.saturating_add(usage.output.unwrap_or(0));
        self.cache_read = self.cache_read.saturating_add(usage.cache_read.unwrap_or(0));
        self.cache_write = self.cache_write.saturating_add(usage.cache_write.unwrap_or(0));
        self.total = self.total.saturating_add(usage.effective_total());
        self.cost += cost.unwrap_or(0.0);
        self.request_count = self.request_count.saturating_add(1);
    }

    pub fn fold_event(&mut self, event: &UsageEvent) {
        self.fold(&event.usage, event.cost);
    }
}

/// Per-provider totals with a nested per-model breakdown.
///
/// The provider's counters sit at the same level as `provider` and `models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub provider: String,
    #[serde(flatten)]
    pub usage: Aggregation,
    pub models: BucketMap<Aggregation>,
}

impl ProviderStats {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            usage: Aggregation::default(),
            models: BucketMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    pub usage: Aggregation,
}

/// Point-in-time view over a filtered slice of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Generation time (ms)
    pub updated_at: i64,
    pub period: Period,
    pub total: Aggregation,
    pub by_provider: BucketMap<ProviderStats>,
    /// Keyed by local `YYYY-MM-DD HH:00`
    pub by_hour: BucketMap<Aggregation>,
    /// Keyed by local `YYYY-MM-DD`
    pub by_day: BucketMap<Aggregation>,
    pub top_models: Vec<ModelUsage>,
}

impl Summary {
    /// Aggregation for a (provider, model) pair, if any events were seen for it
    pub fn model_usage(&self, provider: &str, model: &str) -> Option<&Aggregation> {
        self.by_provider.get(provider)?.models.get(model)
    }
}

/// A summary together with the query it answers, as held by the cache tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSummary {
    pub filter: EventFilter,
    pub summary: Summary,
}

impl CachedSummary {
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.summary.updated_at < ttl_ms
    }
}
