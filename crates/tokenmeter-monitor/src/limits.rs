//! Limit evaluation over aggregated usage
//!
//! Hourly and daily windows read the current bucket of the cached, unfiltered
//! summary. The monthly window is always a fresh scan from the start of the
//! local month and never touches the cache.

use crate::aggregator::Aggregator;
use crate::cache::{SummaryCache, SummaryOptions};
use crate::clock::Clock;
use crate::keys::{day_key, hour_key, month_start};
use tokenmeter_core::limits::percentage;
use tokenmeter_core::{
    Aggregation, AlertThresholds, EventFilter, LimitField, LimitStatus, LimitThreshold,
    LimitUsage, LimitWindow, LimitsConfig,
};
use tracing::{debug, warn};

pub struct LimitChecker<'a> {
    cache: &'a SummaryCache,
    aggregator: &'a Aggregator,
    clock: &'a dyn Clock,
}

impl<'a> LimitChecker<'a> {
    pub fn new(cache: &'a SummaryCache, aggregator: &'a Aggregator, clock: &'a dyn Clock) -> Self {
        Self {
            cache,
            aggregator,
            clock,
        }
    }

    /// First exceeded limit in priority order: hourly, daily, monthly; tokens before cost
    pub async fn check(&self, limits: &LimitsConfig) -> LimitStatus {
        for (window, threshold) in limits.windows() {
            let Some(usage) = self.window_usage(window).await else {
                debug!(window = %window, "No usage recorded in current window");
                continue;
            };

            if let Some(status) = exceeded(window, &threshold, &usage) {
                warn!(
                    window = %window,
                    field = ?status.limit_field,
                    current = status.current,
                    limit = status.limit,
                    "Usage limit exceeded"
                );
                return status;
            }
        }

        LimitStatus::within_limits()
    }

    /// Consumption of every configured threshold, graded against `thresholds`
    pub async fn usage_report(
        &self,
        limits: &LimitsConfig,
        thresholds: &AlertThresholds,
    ) -> Vec<LimitUsage> {
        let mut report = Vec::new();

        for (window, threshold) in limits.windows() {
            let usage = self.window_usage(window).await.unwrap_or_default();

            if let Some(max) = threshold.active_tokens() {
                report.push(graded(window, LimitField::Tokens, usage.total as f64, max as f64, thresholds));
            }
            if let Some(max) = threshold.active_cost() {
                report.push(graded(window, LimitField::Cost, usage.cost, max, thresholds));
            }
        }

        report
    }

    async fn window_usage(&self, window: LimitWindow) -> Option<Aggregation> {
        let now = self.clock.now_ms();

        match window {
            LimitWindow::Hourly => {
                let summary = self.cache.load(&SummaryOptions::default(), self.aggregator).await;
                summary.by_hour.get(&hour_key(now)).cloned()
            }
            LimitWindow::Daily => {
                let summary = self.cache.load(&SummaryOptions::default(), self.aggregator).await;
                summary.by_day.get(&day_key(now)).cloned()
            }
            LimitWindow::Monthly => {
                let filter = EventFilter::default().since(month_start(now)).until(now);
                Some(self.aggregator.summarize(&filter).await.total)
            }
        }
    }
}

fn exceeded(window: LimitWindow, threshold: &LimitThreshold, usage: &Aggregation) -> Option<LimitStatus> {
    if let Some(max) = threshold.active_tokens()
        && usage.total >= max
    {
        return Some(LimitStatus::exceeded(window, LimitField::Tokens, usage.total as f64, max as f64));
    }

    if let Some(max) = threshold.active_cost()
        && usage.cost >= max
    {
        return Some(LimitStatus::exceeded(window, LimitField::Cost, usage.cost, max));
    }

    None
}

fn graded(
    window: LimitWindow,
    field: LimitField,
    current: f64,
    limit: f64,
    thresholds: &AlertThresholds,
) -> LimitUsage {
    let percentage = percentage(current, limit);
    LimitUsage {
        window,
        field,
        current,
        limit,
        percentage,
        level: thresholds.level_for(percentage),
    }
}
