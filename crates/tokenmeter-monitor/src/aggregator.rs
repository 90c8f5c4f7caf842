//! Streaming aggregation of the event log into a [`Summary`]

use crate::clock::Clock;
use crate::keys::{day_key, hour_key};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokenmeter_core::{
    Aggregation, BucketMap, EventFilter, ModelUsage, Period, ProviderStats, Summary,
    TOP_MODELS_LIMIT, UsageEvent,
};
use tokenmeter_storage::EventStore;
use tracing::{debug, warn};

/// Runs a single pass over the event store for each summary request
#[derive(Clone)]
pub struct Aggregator {
    events: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(events: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { events, clock }
    }

    /// Aggregate every event matching `filter`.
    ///
    /// A log that cannot be opened is logged and summarized as empty.
    pub async fn summarize(&self, filter: &EventFilter) -> Summary {
        let now = self.clock.now_ms();

        let events = match self.events.read(filter.clone()).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Failed to read usage log, summarizing no events");
                stream::empty().boxed()
            }
        };

        let summary = summarize_events(events, filter, now).await;
        debug!(
            requests = summary.total.request_count,
            providers = summary.by_provider.len(),
            "Generated usage summary"
        );
        summary
    }
}

/// Fold a stream of already-filtered events into a summary generated at `now`
pub async fn summarize_events<S>(mut events: S, filter: &EventFilter, now: i64) -> Summary
where
    S: Stream<Item = UsageEvent> + Unpin,
{
    let mut builder = SummaryBuilder::new(filter, now);
    while let Some(event) = events.next().await {
        builder.fold(&event);
    }
    builder.finish(now)
}

struct SummaryBuilder {
    period: Period,
    total: Aggregation,
    by_provider: BucketMap<ProviderStats>,
    by_hour: BucketMap<Aggregation>,
    by_day: BucketMap<Aggregation>,
}

impl SummaryBuilder {
    fn new(filter: &EventFilter, now: i64) -> Self {
        Self {
            period: Period {
                start: filter.since.unwrap_or(now),
                end: filter.until.unwrap_or(now),
            },
            total: Aggregation::default(),
            by_provider: BucketMap::new(),
            by_hour: BucketMap::new(),
            by_day: BucketMap::new(),
        }
    }

    fn fold(&mut self, event: &UsageEvent) {
        self.period.start = self.period.start.min(event.timestamp);
        self.period.end = self.period.end.max(event.timestamp);

        self.total.fold_event(event);

        let provider = self
            .by_provider
            .get_or_insert_with(&event.provider, || ProviderStats::new(&event.provider));
        provider.usage.fold_event(event);
        provider
            .models
            .get_or_insert_with(&event.model, Aggregation::default)
            .fold_event(event);

        self.by_hour
            .get_or_insert_with(&hour_key(event.timestamp), Aggregation::default)
            .fold_event(event);
        self.by_day
            .get_or_insert_with(&day_key(event.timestamp), Aggregation::default)
            .fold_event(event);
    }

    fn finish(self, updated_at: i64) -> Summary {
        let top_models = top_models(&self.by_provider);

        Summary {
            updated_at,
            period: self.period,
            total: self.total,
            by_provider: self.by_provider,
            by_hour: self.by_hour,
            by_day: self.by_day,
            top_models,
        }
    }
}

/// Largest (provider, model) pairs by total tokens.
///
/// Candidates are listed in discovery order before a stable sort, so ties keep
/// the order in which the pairs were first seen.
fn top_models(by_provider: &BucketMap<ProviderStats>) -> Vec<ModelUsage> {
    let mut models: Vec<ModelUsage> = by_provider
        .values()
        .flat_map(|stats| {
            stats.models.iter().map(|(model, usage)| ModelUsage {
                provider: stats.provider.clone(),
                model: model.to_string(),
                usage: usage.clone(),
            })
        })
        .collect();

    models.sort_by(|a, b| b.usage.total.cmp(&a.usage.total));
    models.truncate(TOP_MODELS_LIMIT);
    models
}
