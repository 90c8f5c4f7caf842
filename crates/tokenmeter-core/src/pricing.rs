//! Cost estimation from configured per-model rates

use crate::usage::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rates in USD per million tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}

/// Source of cost rates for a provider/model pair
pub trait CostRates: Send + Sync {
    fn rates_for(&self, provider: &str, model: &str) -> Option<ModelCost>;
}

/// Rate table loaded from configuration.
///
/// Keys are either `provider/model` or a bare model name; the qualified key wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    pub models: HashMap<String, ModelCost>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, key: impl Into<String>, cost: ModelCost) -> Self {
        self.models.insert(key.into(), cost);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl CostRates for PricingTable {
    fn rates_for(&self, provider: &str, model: &str) -> Option<ModelCost> {
        self.models
            .get(&format!("{}/{}", provider, model))
            .or_else(|| self.models.get(model))
            .copied()
    }
}

/// Estimate the cost of one request. Zero when no rates are configured.
pub fn estimate_cost(usage: &TokenUsage, rates: Option<&ModelCost>) -> f64 {
    let Some(rates) = rates else {
        return 0.0;
    };

    let input_cost = usage.input.unwrap_or(0) as f64 * rates.input;
    let output_cost = usage.output.unwrap_or(0) as f64 * rates.output;
    let cache_read_cost = usage.cache_read.unwrap_or(0) as f64 * rates.cache_read;
    let cache_write_cost = usage.cache_write.unwrap_or(0) as f64 * rates.cache_write;

    (input_cost + output_cost + cache_read_cost + cache_write_cost) / 1_000_000.0
}
