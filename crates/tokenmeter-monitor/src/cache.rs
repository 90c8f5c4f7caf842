//! Two-tier summary cache
//!
//! The in-process tier is consulted first, then the persisted summary file,
//! and only when both are stale (or answer a different query) is the log
//! re-scanned. Appends invalidate synchronously without touching disk: the
//! persisted tier is merely marked stale for this process until the next
//! regeneration overwrites it.

use crate::aggregator::Aggregator;
use crate::clock::Clock;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokenmeter_core::{CachedSummary, EventFilter, Summary};
use tokenmeter_storage::{StorageResult, SummaryStore};
use tracing::{debug, warn};

/// Default freshness window for cached summaries
pub const DEFAULT_CACHE_TTL_MS: i64 = 60_000;

/// Summary query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryOptions {
    pub filter: EventFilter,
    /// Skip both cache tiers and regenerate
    pub force_refresh: bool,
}

impl SummaryOptions {
    pub fn new(filter: EventFilter) -> Self {
        Self {
            filter,
            force_refresh: false,
        }
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CachedSummary>,
    /// Set by `invalidate`, cleared once a regeneration has been persisted
    persisted_stale: bool,
    /// Bumped on every invalidation so a regeneration racing an append is not cached
    generation: u64,
}

pub struct SummaryCache {
    store: Arc<dyn SummaryStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
    state: Mutex<CacheState>,
}

impl SummaryCache {
    pub fn new(store: Arc<dyn SummaryStore>, clock: Arc<dyn Clock>, ttl_ms: i64) -> Self {
        Self {
            store,
            clock,
            ttl_ms,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Return a fresh summary for `options.filter`, regenerating if needed
    pub async fn load(&self, options: &SummaryOptions, aggregator: &Aggregator) -> Summary {
        if !options.force_refresh {
            if let Some(summary) = self.memory_hit(&options.filter) {
                debug!("Summary served from in-process cache");
                return summary;
            }

            if let Some(summary) = self.persisted_hit(&options.filter).await {
                debug!("Summary served from persisted cache");
                return summary;
            }
        }

        self.refresh(&options.filter, aggregator).await
    }

    /// Regenerate unconditionally and store the result in both tiers
    pub async fn refresh(&self, filter: &EventFilter, aggregator: &Aggregator) -> Summary {
        let generation = self.lock().generation;

        let summary = aggregator.summarize(filter).await;
        let cached = CachedSummary {
            filter: filter.clone(),
            summary: summary.clone(),
        };

        if self.lock().generation != generation {
            debug!("Usage recorded during regeneration, not caching summary");
            return summary;
        }

        let persisted = match self.store.save(&cached).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to persist usage summary");
                false
            }
        };

        let mut state = self.lock();
        if state.generation == generation {
            state.entry = Some(cached);
            if persisted {
                state.persisted_stale = false;
            }
        }

        summary
    }

    /// Drop the in-process entry. Never touches disk.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.entry = None;
        state.persisted_stale = true;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Drop both tiers
    pub async fn clear(&self) -> StorageResult<()> {
        self.invalidate();
        self.store.clear().await
    }

    fn memory_hit(&self, filter: &EventFilter) -> Option<Summary> {
        let now = self.clock.now_ms();
        let state = self.lock();
        state
            .entry
            .as_ref()
            .filter(|cached| cached.filter == *filter && cached.is_fresh(now, self.ttl_ms))
            .map(|cached| cached.summary.clone())
    }

    async fn persisted_hit(&self, filter: &EventFilter) -> Option<Summary> {
        let generation = {
            let state = self.lock();
            if state.persisted_stale {
                return None;
            }
            state.generation
        };

        let cached = match self.store.load().await {
            Ok(Some(cached)) => cached,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted usage summary, regenerating");
                return None;
            }
        };

        let now = self.clock.now_ms();
        if cached.filter != *filter || !cached.is_fresh(now, self.ttl_ms) {
            return None;
        }

        let summary = cached.summary.clone();
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        state.entry = Some(cached);
        Some(summary)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::tempdir;
    use tokenmeter_core::{TokenUsage, UsageEvent};
    use tokenmeter_storage::{EventStore, JsonSummaryStore, JsonlEventStore};

    struct Fixture {
        _dir: tempfile::TempDir,
        clock: Arc<ManualClock>,
        events: Arc<JsonlEventStore>,
        summaries: Arc<JsonSummaryStore>,
        aggregator: Aggregator,
        cache: SummaryCache,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let events = Arc::new(JsonlEventStore::new(dir.path().join("token-monitor.jsonl")));
        let summaries = Arc::new(JsonSummaryStore::new(dir.path().join("token-monitor-summary.json")));
        let aggregator = Aggregator::new(events.clone(), clock.clone());
        let cache = SummaryCache::new(summaries.clone(), clock.clone(), DEFAULT_CACHE_TTL_MS);
        Fixture {
            _dir: dir,
            clock,
            events,
            summaries,
            aggregator,
            cache,
        }
    }

    async fn append(f: &Fixture, input: u64) {
        let event = UsageEvent {
            timestamp: f.clock.now_ms(),
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            usage: TokenUsage::new(input, 0),
            cost: None,
            session_id: None,
            agent_id: None,
        };
        f.events.append(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_within_ttl_does_not_rescan() {
        let f = fixture();
        append(&f, 10).await;

        let options = SummaryOptions::default();
        let first = f.cache.load(&options, &f.aggregator).await;

        // Written behind the cache's back
        append(&f, 20).await;
        f.clock.advance(DEFAULT_CACHE_TTL_MS - 1);

        let second = f.cache.load(&options, &f.aggregator).await;
        assert_eq!(first, second);
        assert_eq!(second.total.request_count, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_regenerates() {
        let f = fixture();
        append(&f, 10).await;

        let options = SummaryOptions::default();
        f.cache.load(&options, &f.aggregator).await;
        append(&f, 20).await;

        f.clock.advance(DEFAULT_CACHE_TTL_MS);
        let summary = f.cache.load(&options, &f.aggregator).await;
        assert_eq!(summary.total.request_count, 2);
    }

    #[tokio::test]
    async fn test_invalidate_skips_persisted_tier() {
        let f = fixture();
        append(&f, 10).await;

        let options = SummaryOptions::default();
        f.cache.load(&options, &f.aggregator).await;
        assert!(f.summaries.path().exists());

        append(&f, 20).await;
        f.cache.invalidate();

        let summary = f.cache.load(&options, &f.aggregator).await;
        assert_eq!(summary.total.request_count, 2);
        assert_eq!(summary.total.input, 30);
    }

    #[tokio::test]
    async fn test_persisted_tier_adopted_by_new_cache() {
        let f = fixture();
        append(&f, 10).await;

        let options = SummaryOptions::default();
        let generated = f.cache.load(&options, &f.aggregator).await;
        append(&f, 20).await;

        let fresh_cache = SummaryCache::new(f.summaries.clone(), f.clock.clone(), DEFAULT_CACHE_TTL_MS);
        let adopted = fresh_cache.load(&options, &f.aggregator).await;
        assert_eq!(adopted, generated);
        assert_eq!(adopted.total.request_count, 1);
    }

    #[tokio::test]
    async fn test_different_filter_misses() {
        let f = fixture();
        append(&f, 10).await;

        f.cache.load(&SummaryOptions::default(), &f.aggregator).await;

        let filtered = SummaryOptions::new(EventFilter::default().provider("anthropic"));
        let summary = f.cache.load(&filtered, &f.aggregator).await;
        assert_eq!(summary.total.request_count, 0);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_both_tiers() {
        let f = fixture();
        append(&f, 10).await;

        let options = SummaryOptions::default();
        f.cache.load(&options, &f.aggregator).await;
        append(&f, 20).await;

        let summary = f.cache.load(&options.clone().force_refresh(), &f.aggregator).await;
        assert_eq!(summary.total.request_count, 2);
    }

    #[tokio::test]
    async fn test_corrupt_persisted_summary_is_a_miss() {
        let f = fixture();
        append(&f, 10).await;
        tokio::fs::write(f.summaries.path(), b"{ not json").await.unwrap();

        let summary = f.cache.load(&SummaryOptions::default(), &f.aggregator).await;
        assert_eq!(summary.total.request_count, 1);
    }

    #[tokio::test]
    async fn test_clear_removes_persisted_summary() {
        let f = fixture();
        append(&f, 10).await;

        f.cache.load(&SummaryOptions::default(), &f.aggregator).await;
        f.cache.clear().await.unwrap();
        assert!(!f.summaries.path().exists());
    }
}
