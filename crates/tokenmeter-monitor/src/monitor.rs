//! Token usage monitor
//!
//! Records usage events, serves cached summaries and evaluates configured
//! limits. Recording is best-effort: a failed append is logged and never
//! surfaces to the caller.

use crate::aggregator::Aggregator;
use crate::cache::{SummaryCache, SummaryOptions};
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::error::MonitorResult;
use crate::limits::LimitChecker;
use crate::retention::RetentionPolicy;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokenmeter_core::{
    AlertThresholds, CostRates, EventFilter, LimitStatus, LimitUsage, LimitsConfig, Summary,
    TokenUsage, UsageEvent, estimate_cost,
};
use tokenmeter_storage::{
    EventStore, EventStream, JsonSummaryStore, JsonlEventStore, SummaryStore, TrimStats,
};
use tracing::{debug, error, info, warn};

const DAY_MS: i64 = 86_400_000;

/// One request's usage as reported by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

impl UsageRecord {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            usage,
            session_id: None,
            agent_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Delete the whole log
    All,
    /// Keep only events from the last N days. Zero behaves like `All`.
    KeepDays(u32),
}

pub struct TokenMonitor {
    enabled: bool,
    events: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    rates: Arc<dyn CostRates>,
    aggregator: Aggregator,
    cache: SummaryCache,
    limits: Option<LimitsConfig>,
    alert_thresholds: AlertThresholds,
    retention: Option<RetentionPolicy>,
    /// Appends hold it shared, trims and clears exclusively
    log_guard: RwLock<()>,
}

impl TokenMonitor {
    /// Build a monitor over the JSONL log and summary file in `config.data_dir`
    pub fn from_config(config: &MonitorConfig) -> MonitorResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &MonitorConfig, clock: Arc<dyn Clock>) -> MonitorResult<Self> {
        config.validate()?;

        let events = Arc::new(JsonlEventStore::new(config.log_path()));
        let summaries = Arc::new(JsonSummaryStore::new(config.summary_path()));

        Ok(Self::new(events, summaries, clock, config))
    }

    /// Assemble a monitor from explicit stores
    pub fn new(
        events: Arc<dyn EventStore>,
        summaries: Arc<dyn SummaryStore>,
        clock: Arc<dyn Clock>,
        config: &MonitorConfig,
    ) -> Self {
        let aggregator = Aggregator::new(events.clone(), clock.clone());
        let cache = SummaryCache::new(summaries, clock.clone(), config.cache_ttl());

        Self {
            enabled: config.enabled,
            events,
            clock,
            rates: Arc::new(config.pricing.clone()),
            aggregator,
            cache,
            limits: config.limits,
            alert_thresholds: config.alert_thresholds,
            retention: config.retention,
            log_guard: RwLock::new(()),
        }
    }

    /// Replace the configured pricing table with another rate source
    pub fn with_rates(mut self, rates: Arc<dyn CostRates>) -> Self {
        self.rates = rates;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn limits(&self) -> Option<&LimitsConfig> {
        self.limits.as_ref()
    }

    /// Configured retention policy, if any
    pub fn retention(&self) -> Option<&RetentionPolicy> {
        self.retention.as_ref()
    }

    /// Append one usage event and invalidate the in-process summary
    pub async fn record(&self, record: UsageRecord) {
        if !self.enabled {
            debug!(provider = %record.provider, model = %record.model, "Token monitoring disabled, not recording");
            return;
        }

        let rates = self.rates.rates_for(&record.provider, &record.model);
        let cost = estimate_cost(&record.usage, rates.as_ref());

        let event = UsageEvent {
            timestamp: self.clock.now_ms(),
            provider: record.provider,
            model: record.model,
            usage: record.usage,
            cost: Some(cost),
            session_id: record.session_id,
            agent_id: record.agent_id,
        };

        let appended = {
            let _guard = self.log_guard.read().await;
            self.events.append(&event).await
        };

        if let Err(e) = appended {
            error!(
                provider = %event.provider,
                model = %event.model,
                error = %e,
                "Failed to record token usage"
            );
        } else {
            debug!(
                provider = %event.provider,
                model = %event.model,
                total = event.usage.effective_total(),
                cost,
                "Recorded token usage"
            );
        }

        self.cache.invalidate();
    }

    /// Raw events matching `filter`, in log order
    pub async fn events(&self, filter: EventFilter) -> EventStream {
        match self.events.read(filter).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Failed to read usage log");
                stream::empty().boxed()
            }
        }
    }

    /// Summary through the cache tiers
    pub async fn summary(&self, options: SummaryOptions) -> Summary {
        self.cache.load(&options, &self.aggregator).await
    }

    /// Regenerate a summary and refresh both cache tiers
    pub async fn generate_summary(&self, filter: EventFilter) -> Summary {
        self.cache.refresh(&filter, &self.aggregator).await
    }

    /// `None` when no limits are configured
    pub async fn check_limits(&self) -> Option<LimitStatus> {
        let limits = self.limits.as_ref()?;
        Some(self.limit_checker().check(limits).await)
    }

    /// Consumption of each configured threshold; empty when no limits are configured
    pub async fn limit_usage(&self) -> Vec<LimitUsage> {
        match &self.limits {
            Some(limits) => {
                self.limit_checker()
                    .usage_report(limits, &self.alert_thresholds)
                    .await
            }
            None => Vec::new(),
        }
    }

    /// Delete recorded usage. Returns trim statistics for `KeepDays`.
    pub async fn reset(&self, mode: ResetMode) -> MonitorResult<Option<TrimStats>> {
        let _guard = self.log_guard.write().await;

        let stats = match mode {
            ResetMode::All | ResetMode::KeepDays(0) => {
                self.events.clear().await?;
                info!("Cleared all recorded token usage");
                None
            }
            ResetMode::KeepDays(days) => {
                let cutoff = self.clock.now_ms() - i64::from(days) * DAY_MS;
                let stats = self.events.trim(cutoff).await?;
                info!(
                    keep_days = days,
                    kept = stats.kept,
                    removed = stats.removed,
                    "Trimmed recorded token usage"
                );
                Some(stats)
            }
        };

        self.cache.clear().await?;
        Ok(stats)
    }

    /// Trim the log once according to the configured retention policy.
    /// Returns `None` when no policy is configured.
    pub async fn apply_retention(&self) -> MonitorResult<Option<TrimStats>> {
        match self.retention {
            Some(policy) => self.reset(ResetMode::KeepDays(policy.keep_days)).await,
            None => {
                debug!("No retention policy configured");
                Ok(None)
            }
        }
    }

    fn limit_checker(&self) -> LimitChecker<'_> {
        LimitChecker::new(&self.cache, &self.aggregator, self.clock.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::MonitorError;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokenmeter_core::{ModelCost, PricingTable};
    use tokenmeter_storage::{StorageError, StorageResult};

    /// Event store whose every operation fails
    struct BrokenStore;

    fn broken() -> StorageError {
        StorageError::Io(std::io::Error::other("disk on fire"))
    }

    #[async_trait]
    impl EventStore for BrokenStore {
        async fn append(&self, _event: &UsageEvent) -> StorageResult<()> {
            Err(broken())
        }

        async fn read(&self, _filter: EventFilter) -> StorageResult<EventStream> {
            Err(broken())
        }

        async fn trim(&self, _cutoff: i64) -> StorageResult<TrimStats> {
            Err(broken())
        }

        async fn clear(&self) -> StorageResult<()> {
            Err(broken())
        }
    }

    fn config(dir: &TempDir) -> MonitorConfig {
        MonitorConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_stamps_time_and_cost() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.pricing = PricingTable::new().with_rate(
            "claude-3-opus",
            ModelCost {
                input: 15.0,
                output: 75.0,
                ..Default::default()
            },
        );
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let monitor = TokenMonitor::with_clock(&config, clock).unwrap();

        monitor
            .record(
                UsageRecord::new("anthropic", "claude-3-opus", TokenUsage::new(1_000_000, 0))
                    .with_session("s-1"),
            )
            .await;
        monitor
            .record(UsageRecord::new("openai", "gpt-4", TokenUsage::new(10, 10)))
            .await;

        let events: Vec<UsageEvent> = monitor.events(EventFilter::default()).await.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, 1_700_000_000_000);
        assert_eq!(events[0].cost, Some(15.0));
        assert_eq!(events[0].session_id.as_deref(), Some("s-1"));
        assert_eq!(events[1].cost, Some(0.0));
    }

    #[tokio::test]
    async fn test_disabled_monitor_records_nothing() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.enabled = false;
        let monitor = TokenMonitor::from_config(&config).unwrap();

        monitor
            .record(UsageRecord::new("openai", "gpt-4", TokenUsage::new(1, 1)))
            .await;

        assert!(!config.log_path().exists());
    }

    #[tokio::test]
    async fn test_append_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let monitor = TokenMonitor::new(
            Arc::new(BrokenStore),
            Arc::new(JsonSummaryStore::new(config.summary_path())),
            Arc::new(SystemClock),
            &config,
        );

        monitor
            .record(UsageRecord::new("openai", "gpt-4", TokenUsage::new(1, 1)))
            .await;

        let events: Vec<UsageEvent> = monitor.events(EventFilter::default()).await.collect().await;
        assert!(events.is_empty());

        let summary = monitor.summary(SummaryOptions::default()).await;
        assert_eq!(summary.total.request_count, 0);
    }

    #[tokio::test]
    async fn test_reset_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let monitor = TokenMonitor::new(
            Arc::new(BrokenStore),
            Arc::new(JsonSummaryStore::new(config.summary_path())),
            Arc::new(SystemClock),
            &config,
        );

        let err = monitor.reset(ResetMode::All).await.unwrap_err();
        assert!(matches!(err, MonitorError::Storage(_)));
        assert!(monitor.reset(ResetMode::KeepDays(3)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.cache_ttl_ms = 0;

        let result = TokenMonitor::from_config(&config);
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    #[tokio::test]
    async fn test_apply_retention_uses_configured_policy() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        let now = 1_700_000_000_000;
        let clock = Arc::new(ManualClock::new(now - 10 * DAY_MS));

        let unconfigured = TokenMonitor::with_clock(&config, clock.clone()).unwrap();
        unconfigured
            .record(UsageRecord::new("openai", "gpt-4", TokenUsage::new(1, 1)))
            .await;
        clock.set(now);
        unconfigured
            .record(UsageRecord::new("openai", "gpt-4", TokenUsage::new(2, 2)))
            .await;
        assert!(unconfigured.apply_retention().await.unwrap().is_none());

        config.retention = Some(RetentionPolicy::new(7));
        let monitor = TokenMonitor::with_clock(&config, clock).unwrap();
        assert_eq!(monitor.retention().map(|p| p.keep_days), Some(7));

        let stats = monitor.apply_retention().await.unwrap().unwrap();
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.removed, 1);

        let events: Vec<UsageEvent> = monitor.events(EventFilter::default()).await.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, now);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_trim_does_not_lose_concurrent_appends() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let monitor = Arc::new(TokenMonitor::with_clock(&config(&dir), clock).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = monitor.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        monitor
                            .record(UsageRecord::new("openai", "gpt-4", TokenUsage::new(1, 0)))
                            .await;
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            monitor.reset(ResetMode::KeepDays(1)).await.unwrap();
            tokio::task::yield_now().await;
        }
        for writer in writers {
            writer.await.unwrap();
        }

        let events: Vec<UsageEvent> = monitor.events(EventFilter::default()).await.collect().await;
        assert_eq!(events.len(), 200);
    }

    #[tokio::test]
    async fn test_custom_rate_source() {
        struct Flat;
        impl CostRates for Flat {
            fn rates_for(&self, _provider: &str, _model: &str) -> Option<ModelCost> {
                Some(ModelCost {
                    input: 1.0,
                    output: 1.0,
                    cache_read: 1.0,
                    cache_write: 1.0,
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let monitor = TokenMonitor::from_config(&config(&dir))
            .unwrap()
            .with_rates(Arc::new(Flat));

        monitor
            .record(UsageRecord::new("x", "y", TokenUsage::new(500_000, 500_000)))
            .await;

        let summary = monitor.summary(SummaryOptions::default()).await;
        assert!((summary.total.cost - 1.0).abs() < 1e-9);
    }
}
