//! Rate source adapters
//!
//! Each adapter talks to exactly one upstream quote provider and returns
//! INR-per-gram quotes. Adapters never retry; the gold rate service owns
//! retry and fallback.

pub mod types;
pub mod metals_api;
pub mod gold_api;
pub mod static_fallback;

use crate::config::SourcesConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use types::*;

/// Rate source trait that all upstream adapters implement
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Source ID written to rate history (e.g., "metals_api")
    fn id(&self) -> &'static str;

    /// Display name
    fn name(&self) -> &'static str;

    /// Fetch the current rate for one metal
    async fn fetch_rate(&self, metal: Metal) -> FetchResult<RateQuote>;

    /// Fetch a full rate set; fails if any metal fails
    async fn fetch_rates(&self, metals: &[Metal]) -> FetchResult<Vec<RateQuote>> {
        let mut quotes = Vec::with_capacity(metals.len());
        for metal in metals {
            quotes.push(self.fetch_rate(*metal).await?);
        }
        Ok(quotes)
    }
}

/// Ordered list of rate sources: primary first, static fallback last
pub struct SourceRegistry {
    sources: Vec<Arc<dyn RateSource>>,
}

impl SourceRegistry {
    /// Build the standard source chain from configuration
    pub fn from_config(config: &SourcesConfig, timeout: Duration) -> Result<Self> {
        let mut sources: Vec<Arc<dyn RateSource>> = vec![
            Arc::new(metals_api::MetalsApiSource::new(
                &config.metals_api_url,
                config.metals_api_key.clone(),
                timeout,
            )?),
            Arc::new(gold_api::GoldApiSource::new(
                &config.gold_api_url,
                config.gold_api_key.clone(),
                timeout,
            )?),
        ];

        if config.static_fallback_enabled {
            sources.push(Arc::new(static_fallback::StaticFallbackSource::new(
                config.static_rates.clone(),
            )));
        }

        Ok(Self { sources })
    }

    /// Build a registry from an explicit ordered list
    pub fn with_sources(sources: Vec<Arc<dyn RateSource>>) -> Self {
        Self { sources }
    }

    /// Sources in fallback order
    pub fn list(&self) -> &[Arc<dyn RateSource>] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_registry_order() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let registry =
            SourceRegistry::from_config(&config.sources, Duration::from_secs(10)).unwrap();

        let ids: Vec<&str> = registry.list().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["metals_api", "gold_api", STATIC_FALLBACK_SOURCE]);
    }

    #[test]
    fn test_static_fallback_can_be_disabled() {
        let config = AppConfig::from_lookup(|key| {
            (key == "STATIC_FALLBACK_ENABLED").then(|| "false".to_string())
        })
        .unwrap();
        let registry =
            SourceRegistry::from_config(&config.sources, Duration::from_secs(10)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.list().iter().all(|s| s.id() != STATIC_FALLBACK_SOURCE));
    }
}
