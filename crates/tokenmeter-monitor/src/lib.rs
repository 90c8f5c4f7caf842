//! Tokenmeter Monitor
//!
//! This crate records AI provider token usage and answers queries over it:
//! - Usage recording with cost estimation
//! - Streaming aggregation by provider, model, hour and day
//! - Two-tier summary cache (in-process and persisted)
//! - Hourly, daily and monthly limit checks
//! - Background retention

pub mod aggregator;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod limits;
pub mod monitor;
pub mod retention;

pub use aggregator::Aggregator;
pub use cache::{DEFAULT_CACHE_TTL_MS, SummaryCache, SummaryOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use limits::LimitChecker;
pub use monitor::{ResetMode, TokenMonitor, UsageRecord};
pub use retention::{RetentionPolicy, RetentionTask, spawn_retention_task};
