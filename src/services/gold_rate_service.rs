//! Gold Rate Service
//!
//! Keeps the current rate set fresh. Refreshes walk the rate sources in
//! fixed order under the shared retry policy; reads are cache-first with a
//! fallback to the latest persisted rates and never trigger a live fetch.

use crate::db::sqlite::to_db_precision;
use crate::error::{AppError, Result};
use crate::pricing::calculator::round_money;
use crate::sources::types::{FetchError, Metal, MetalRate};
use crate::state::{AppState, RefreshStatus};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Longest history window served
pub const MAX_HISTORY_DAYS: i64 = 365;

/// Current rate set as served to callers
#[derive(Debug, Clone, Serialize)]
pub struct RateSnapshot {
    pub rates: BTreeMap<Metal, MetalRate>,
    /// Served from the in-memory cache rather than the store
    pub from_cache: bool,
    /// At least one rate is a static fallback value, not a live quote
    pub static_fallback: bool,
}

impl RateSnapshot {
    fn new(rates: Vec<MetalRate>, from_cache: bool) -> Self {
        let static_fallback = rates.iter().any(MetalRate::is_static_fallback);
        Self {
            rates: rates.into_iter().map(|r| (r.symbol, r)).collect(),
            from_cache,
            static_fallback,
        }
    }
}

/// Result of a successful refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub source: String,
    pub rates: Vec<MetalRate>,
    pub static_fallback: bool,
}

/// Gold rate for one purity label
#[derive(Debug, Clone, Serialize)]
pub struct PurityRate {
    pub purity: String,
    pub factor: Decimal,
    pub rate_per_gram: Decimal,
}

/// Gold rate service for business logic
pub struct GoldRateService;

impl GoldRateService {
    /// Fetch a fresh rate set and publish it.
    ///
    /// The first source to succeed wins and later sources are not called.
    /// On success the rates are appended to history and then written to the
    /// cache. If every source fails nothing is written.
    pub async fn update_rates(state: &AppState) -> Result<RefreshResult> {
        let metals = &state.config.sources.tracked_metals;
        let attempt_timeout = state.config.refresh.attempt_timeout;
        let mut failures = Vec::new();

        info!(
            "GoldRateService::update_rates - {} metals, {} sources, {} attempts each",
            metals.len(),
            state.sources.len(),
            state.retry_policy.max_attempts()
        );

        for source in state.sources.list() {
            let label = format!("{} fetch", source.id());
            let result = state
                .retry_policy
                .run(
                    &label,
                    |attempt| async move {
                        debug!("Fetching rates from {} (attempt {})", source.id(), attempt);
                        match tokio::time::timeout(attempt_timeout, source.fetch_rates(metals)).await {
                            Ok(result) => result,
                            Err(_) => Err(FetchError::Unavailable(format!(
                                "timed out after {}ms",
                                attempt_timeout.as_millis()
                            ))),
                        }
                    },
                    FetchError::is_retryable,
                )
                .await;

            match result {
                Ok(quotes) if quotes.is_empty() => {
                    warn!("{} returned no quotes", source.id());
                    failures.push(format!("{}: empty response", source.id()));
                }
                Ok(quotes) => {
                    let rates: Vec<MetalRate> = quotes
                        .into_iter()
                        .map(|quote| {
                            let mut rate = MetalRate::from(quote);
                            rate.recorded_at = to_db_precision(rate.recorded_at);
                            rate
                        })
                        .collect();
                    return Self::publish(state, source.id(), rates);
                }
                Err(FetchError::Unconfigured(reason)) => {
                    info!("Skipping {}: {}", source.id(), reason);
                    failures.push(format!("{}: not configured", source.id()));
                }
                Err(e) => {
                    warn!("Rate source {} failed: {}", source.id(), e);
                    failures.push(format!("{}: {}", source.id(), e));
                }
            }
        }

        error!("All rate sources failed: {}", failures.join("; "));
        Err(AppError::AllSourcesUnavailable(failures.join("; ")))
    }

    fn publish(state: &AppState, source: &str, rates: Vec<MetalRate>) -> Result<RefreshResult> {
        state.sqlite.insert_rates(&rates)?;

        for rate in &rates {
            state.rate_cache.set(rate.clone());
        }

        let static_fallback = rates.iter().any(MetalRate::is_static_fallback);
        if static_fallback {
            warn!("Serving static fallback rates; no live source answered");
        } else {
            info!("Updated {} rates from {}", rates.len(), source);
        }

        state.set_last_refresh(RefreshStatus {
            source: source.to_string(),
            refreshed_at: Utc::now(),
            rate_count: rates.len(),
            static_fallback,
        });

        Ok(RefreshResult {
            source: source.to_string(),
            rates,
            static_fallback,
        })
    }

    /// Current rates, cache first
    pub fn get_current_rates(state: &AppState) -> Result<RateSnapshot> {
        let metals = &state.config.sources.tracked_metals;

        if let Some(rates) = state.rate_cache.get_all(metals) {
            return Ok(RateSnapshot::new(rates, true));
        }

        debug!("Rate cache miss, reading latest persisted rates");
        let rates = state.sqlite.latest_rates()?;
        if rates.is_empty() {
            return Err(AppError::Unavailable("No metal rates available yet".to_string()));
        }

        Ok(RateSnapshot::new(rates, false))
    }

    /// Current rate for one metal, cache first
    pub fn get_current_rate(state: &AppState, metal: Metal) -> Result<MetalRate> {
        if let Some(rate) = state.rate_cache.get(metal) {
            return Ok(rate);
        }

        state
            .sqlite
            .latest_rate(metal)?
            .ok_or_else(|| AppError::Unavailable(format!("No rate available for {}", metal)))
    }

    /// Rate history for the last `days` days
    pub fn get_rate_history(
        state: &AppState,
        days: i64,
        metal: Option<Metal>,
    ) -> Result<Vec<MetalRate>> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(AppError::InvalidInput(format!(
                "days must be between 1 and {}",
                MAX_HISTORY_DAYS
            )));
        }

        let since = Utc::now() - Duration::days(days);
        state.sqlite.rate_history(since, metal)
    }

    /// Current gold rate scaled to each karat purity
    pub fn purity_rates(state: &AppState) -> Result<Vec<PurityRate>> {
        let gold = Self::get_current_rate(state, Metal::Gold)?;

        Ok(state
            .config
            .pricing
            .purities
            .karat_entries()
            .map(|entry| PurityRate {
                purity: entry.label.clone(),
                factor: entry.factor,
                rate_per_gram: round_money(gold.rate_per_gram * entry.factor),
            })
            .collect())
    }

    /// Drop every cached rate; the next read goes to the store
    pub fn invalidate_cache(state: &AppState) {
        state.rate_cache.clear();
        info!("Rate cache invalidated");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::RateCache;
    use crate::config::AppConfig;
    use crate::db::sqlite::SqliteDb;
    use crate::sources::types::{FetchResult, RateQuote, STATIC_FALLBACK_SOURCE};
    use crate::sources::{RateSource, SourceRegistry};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    /// Scripted source: pops one outcome per batch fetch, then repeats `fallback`
    pub(crate) struct FakeSource {
        id: &'static str,
        script: Mutex<VecDeque<FetchResult<Decimal>>>,
        fallback: FetchResult<Decimal>,
        delay: StdDuration,
        calls: AtomicU32,
    }

    impl FakeSource {
        pub(crate) fn new(id: &'static str, fallback: FetchResult<Decimal>) -> Arc<Self> {
            Self::scripted(id, vec![], fallback)
        }

        pub(crate) fn scripted(
            id: &'static str,
            script: Vec<FetchResult<Decimal>>,
            fallback: FetchResult<Decimal>,
        ) -> Arc<Self> {
            Arc::new(Self {
                id,
                script: Mutex::new(script.into()),
                fallback,
                delay: StdDuration::ZERO,
                calls: AtomicU32::new(0),
            })
        }

        pub(crate) fn slow(id: &'static str, delay: StdDuration) -> Arc<Self> {
            Arc::new(Self {
                id,
                script: Mutex::new(VecDeque::new()),
                fallback: Ok(dec!(1)),
                delay,
                calls: AtomicU32::new(0),
            })
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateSource for FakeSource {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Fake"
        }

        async fn fetch_rate(&self, metal: Metal) -> FetchResult<RateQuote> {
            let mut quotes = self.fetch_rates(&[metal]).await?;
            Ok(quotes.remove(0))
        }

        async fn fetch_rates(&self, metals: &[Metal]) -> FetchResult<Vec<RateQuote>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let next = self.script.lock().pop_front();
            let value = next.unwrap_or_else(|| self.fallback.clone())?;
            metals
                .iter()
                .map(|m| RateQuote::new(*m, value, self.id))
                .collect()
        }
    }

    pub(crate) fn test_state(sources: Vec<Arc<FakeSource>>) -> AppState {
        let sources: Vec<Arc<dyn RateSource>> = sources
            .into_iter()
            .map(|s| s as Arc<dyn RateSource>)
            .collect();
        let config = AppConfig::from_lookup(|key| match key {
            "RATE_FETCH_BACKOFF_MS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
        let sqlite = Arc::new(SqliteDb::open_in_memory(config.refresh.store_timeout).unwrap());
        AppState::with_components(config, sqlite, Arc::new(SourceRegistry::with_sources(sources)))
    }

    fn unavailable() -> FetchResult<Decimal> {
        Err(FetchError::Unavailable("connection refused".to_string()))
    }

    fn seed_rate(value: Decimal) -> MetalRate {
        MetalRate {
            symbol: Metal::Gold,
            rate_per_gram: value,
            source: "seed".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_first_success_wins_after_retries() {
        let primary = FakeSource::scripted("primary", vec![unavailable(), unavailable()], Ok(dec!(6800)));
        let secondary = FakeSource::new("secondary", Ok(dec!(7000)));
        let state = test_state(vec![primary.clone(), secondary.clone()]);

        let result = GoldRateService::update_rates(&state).await.unwrap();

        assert_eq!(result.source, "primary");
        assert_eq!(primary.calls(), 3);
        assert_eq!(secondary.calls(), 0);
        assert_eq!(state.sqlite.count_rates().unwrap(), 3);
        assert_eq!(
            state.rate_cache.get(Metal::Gold).unwrap().rate_per_gram,
            dec!(6800)
        );
        assert_eq!(state.get_last_refresh().unwrap().source, "primary");
    }

    #[tokio::test]
    async fn test_cached_rate_matches_stored_rate() {
        let state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        GoldRateService::update_rates(&state).await.unwrap();

        let cached = state.rate_cache.get(Metal::Gold).unwrap();
        let stored = state.sqlite.latest_rate(Metal::Gold).unwrap().unwrap();
        assert_eq!(cached, stored);
    }

    #[tokio::test]
    async fn test_exhausted_source_fails_over() {
        let primary = FakeSource::new("primary", unavailable());
        let secondary = FakeSource::new("secondary", Ok(dec!(7000)));
        let state = test_state(vec![primary.clone(), secondary.clone()]);

        let result = GoldRateService::update_rates(&state).await.unwrap();

        assert_eq!(result.source, "secondary");
        assert_eq!(primary.calls(), 3);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_skipped_without_retry() {
        let primary = FakeSource::new("primary", Err(FetchError::Unconfigured("no key".into())));
        let secondary = FakeSource::new("secondary", Ok(dec!(7000)));
        let state = test_state(vec![primary.clone(), secondary.clone()]);

        GoldRateService::update_rates(&state).await.unwrap();
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_fail_leaves_state_untouched() {
        let a = FakeSource::new("a", unavailable());
        let b = FakeSource::new("b", Err(FetchError::MalformedResponse("bad json".into())));
        let c = FakeSource::new("c", Err(FetchError::Unconfigured("no key".into())));
        let state = test_state(vec![a, b, c]);

        state.sqlite.insert_rates(&[seed_rate(dec!(6500))]).unwrap();
        state.rate_cache.set(seed_rate(dec!(6500)));

        let result = GoldRateService::update_rates(&state).await;

        assert!(matches!(result, Err(AppError::AllSourcesUnavailable(_))));
        assert_eq!(state.sqlite.count_rates().unwrap(), 1);
        assert_eq!(
            state.rate_cache.get(Metal::Gold).unwrap().rate_per_gram,
            dec!(6500)
        );
        assert!(state.get_last_refresh().is_none());
    }

    #[tokio::test]
    async fn test_hung_source_times_out() {
        let hung = FakeSource::slow("hung", StdDuration::from_secs(5));
        let backup = FakeSource::new("backup", Ok(dec!(6900)));
        let mut state = test_state(vec![hung.clone(), backup]);
        state.config.refresh.attempt_timeout = StdDuration::from_millis(20);

        let result = GoldRateService::update_rates(&state).await.unwrap();

        assert_eq!(result.source, "backup");
        assert_eq!(hung.calls(), 3);
    }

    #[tokio::test]
    async fn test_reads_come_from_cache_after_update() {
        let state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        GoldRateService::update_rates(&state).await.unwrap();

        // A newer row in the store is not visible while the cache is fresh
        state.sqlite.insert_rates(&[seed_rate(dec!(9999))]).unwrap();

        let snapshot = GoldRateService::get_current_rates(&state).unwrap();
        assert!(snapshot.from_cache);
        assert!(!snapshot.static_fallback);
        assert_eq!(snapshot.rates[&Metal::Gold].rate_per_gram, dec!(6800));
    }

    #[tokio::test]
    async fn test_expired_cache_falls_back_to_store() {
        let mut state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        state.rate_cache = RateCache::new(StdDuration::from_millis(20));
        GoldRateService::update_rates(&state).await.unwrap();

        state.sqlite.insert_rates(&[seed_rate(dec!(6850))]).unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let snapshot = GoldRateService::get_current_rates(&state).unwrap();
        assert!(!snapshot.from_cache);
        assert_eq!(snapshot.rates[&Metal::Gold].rate_per_gram, dec!(6850));
        assert_eq!(
            GoldRateService::get_current_rate(&state, Metal::Gold).unwrap().rate_per_gram,
            dec!(6850)
        );
    }

    #[tokio::test]
    async fn test_invalidated_cache_reads_store() {
        let state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        GoldRateService::update_rates(&state).await.unwrap();

        GoldRateService::invalidate_cache(&state);

        assert!(state.rate_cache.is_empty());
        let snapshot = GoldRateService::get_current_rates(&state).unwrap();
        assert!(!snapshot.from_cache);
        assert_eq!(snapshot.rates[&Metal::Gold].rate_per_gram, dec!(6800));
    }

    #[tokio::test]
    async fn test_static_fallback_is_flagged() {
        let live = FakeSource::new("live", unavailable());
        let fallback = FakeSource::new(STATIC_FALLBACK_SOURCE, Ok(dec!(6800)));
        let state = test_state(vec![live, fallback]);

        let result = GoldRateService::update_rates(&state).await.unwrap();
        assert!(result.static_fallback);

        let snapshot = GoldRateService::get_current_rates(&state).unwrap();
        assert!(snapshot.static_fallback);
        assert!(state.get_last_refresh().unwrap().static_fallback);
    }

    #[test]
    fn test_empty_store_is_unavailable() {
        let state = test_state(vec![]);
        assert!(matches!(
            GoldRateService::get_current_rates(&state),
            Err(AppError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_purity_rates_and_history() {
        let state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        GoldRateService::update_rates(&state).await.unwrap();

        let purities = GoldRateService::purity_rates(&state).unwrap();
        let k22 = purities.iter().find(|p| p.purity == "22K").unwrap();
        assert_eq!(k22.rate_per_gram, dec!(6228.8));
        assert_eq!(purities.len(), 5);

        let history = GoldRateService::get_rate_history(&state, 7, Some(Metal::Gold)).unwrap();
        assert_eq!(history.len(), 1);

        assert!(matches!(
            GoldRateService::get_rate_history(&state, 0, None),
            Err(AppError::InvalidInput(_))
        ));
        assert!(GoldRateService::get_rate_history(&state, 366, None).is_err());
    }
}
