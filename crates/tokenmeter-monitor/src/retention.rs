//! Periodic trimming of the usage log

use crate::monitor::{ResetMode, TokenMonitor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{Duration, interval};

/// How long events are kept and how often the log is trimmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// Events older than this many days are dropped
    pub keep_days: u32,

    /// Run the trim every N minutes
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
}

fn default_interval_minutes() -> u32 {
    60
}

impl RetentionPolicy {
    pub fn new(keep_days: u32) -> Self {
        Self {
            keep_days,
            interval_minutes: default_interval_minutes(),
        }
    }

    /// Validate the retention policy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.keep_days == 0 {
            return Err("keepDays must be at least 1".to_string());
        }

        if self.interval_minutes == 0 {
            return Err("intervalMinutes must be at least 1".to_string());
        }

        Ok(())
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

/// Handle for the background retention task
pub struct RetentionTask {
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl RetentionTask {
    /// Signal the retention task to stop and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

/// Spawn a background task that trims the log now and then on every interval.
///
/// Failures are logged and the task keeps running.
pub fn spawn_retention_task(monitor: Arc<TokenMonitor>, policy: RetentionPolicy) -> RetentionTask {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(policy.interval());

        tracing::info!(
            keep_days = policy.keep_days,
            interval_minutes = policy.interval_minutes,
            "Starting usage retention task"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Usage retention task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = monitor.reset(ResetMode::KeepDays(policy.keep_days)).await {
                        tracing::error!(error = %e, "Usage retention cycle failed");
                    }
                }
            }
        }
    });

    RetentionTask {
        shutdown_tx,
        handle,
    }
}
