//! Tokenmeter Core Types
//!
//! This crate provides the fundamental types shared by the Tokenmeter crates:
//! - Usage events and event filters
//! - Aggregations and summaries
//! - Limit configuration and status
//! - Cost estimation
//! - Core error types

pub mod buckets;
pub mod error;
pub mod limits;
pub mod pricing;
pub mod summary;
pub mod usage;

pub use buckets::BucketMap;
pub use error::{Error, Result};
pub use limits::{
    AlertLevel, AlertThresholds, LimitField, LimitStatus, LimitThreshold, LimitUsage, LimitWindow,
    LimitsConfig,
};
pub use pricing::{CostRates, ModelCost, PricingTable, estimate_cost};
pub use summary::{
    Aggregation, CachedSummary, ModelUsage, Period, ProviderStats, Summary, TOP_MODELS_LIMIT,
};
pub use usage::{EventFilter, TokenUsage, UsageEvent};
