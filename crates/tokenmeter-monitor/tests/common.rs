//! Shared fixtures for monitor integration tests

#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;
use tokenmeter_core::{LimitsConfig, TokenUsage, UsageEvent};
use tokenmeter_monitor::{ManualClock, MonitorConfig, TokenMonitor, UsageRecord};
use tokenmeter_storage::{EventStore, JsonlEventStore};

/// 2023-11-14T22:13:20Z
pub const START_MS: i64 = 1_700_000_000_000;

pub const DAY_MS: i64 = 86_400_000;

pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub config: MonitorConfig,
    pub monitor: TokenMonitor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limits(None)
    }

    pub fn with_limits(limits: Option<LimitsConfig>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            limits,
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::new(START_MS));
        let monitor = TokenMonitor::with_clock(&config, clock.clone()).unwrap();

        Self {
            dir,
            clock,
            config,
            monitor,
        }
    }

    /// A second monitor over the same data directory, as another process would see it
    pub fn reopen(&self) -> TokenMonitor {
        TokenMonitor::with_clock(&self.config, self.clock.clone()).unwrap()
    }

    pub async fn record(&self, provider: &str, model: &str, input: u64, output: u64) {
        self.monitor
            .record(UsageRecord::new(provider, model, TokenUsage::new(input, output)))
            .await;
    }

    /// Append straight to the log without going through the monitor
    pub async fn append_behind_back(&self, timestamp: i64, provider: &str, model: &str, input: u64) {
        let event = UsageEvent {
            timestamp,
            provider: provider.to_string(),
            model: model.to_string(),
            usage: TokenUsage::new(input, 0),
            cost: None,
            session_id: None,
            agent_id: None,
        };
        JsonlEventStore::new(self.config.log_path())
            .append(&event)
            .await
            .unwrap();
    }

    pub async fn append_raw(&self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.config.log_path())
            .await
            .unwrap();
        file.write_all(bytes).await.unwrap();
        file.flush().await.unwrap();
    }
}
