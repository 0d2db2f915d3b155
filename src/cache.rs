//! In-memory TTL cache for current metal rates.

use crate::sources::types::{Metal, MetalRate};
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CachedRate {
    rate: MetalRate,
    expires_at: Instant,
}

/// Metal symbol -> current rate, each entry with its own expiry.
///
/// Every write replaces the whole entry, so concurrent refreshes race only
/// on which value lands last.
pub struct RateCache {
    rates: DashMap<Metal, CachedRate>,
    ttl: Duration,
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            rates: DashMap::new(),
            ttl,
        }
    }

    /// Store a rate with the default TTL
    pub fn set(&self, rate: MetalRate) {
        self.set_with_ttl(rate, self.ttl);
    }

    /// Store a rate with an explicit TTL
    pub fn set_with_ttl(&self, rate: MetalRate, ttl: Duration) {
        self.rates.insert(
            rate.symbol,
            CachedRate {
                rate,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Get a rate if present and not expired
    pub fn get(&self, metal: Metal) -> Option<MetalRate> {
        self.rates
            .get(&metal)
            .filter(|c| c.expires_at > Instant::now())
            .map(|c| c.rate.clone())
    }

    /// Get every requested rate, or `None` if any is missing or expired
    pub fn get_all(&self, metals: &[Metal]) -> Option<Vec<MetalRate>> {
        metals.iter().map(|m| self.get(*m)).collect()
    }

    /// Clear all rates
    pub fn clear(&self) {
        self.rates.clear();
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300)) // 5 minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn rate(metal: Metal, value: rust_decimal::Decimal) -> MetalRate {
        MetalRate {
            symbol: metal,
            rate_per_gram: value,
            source: "test".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_set_and_get() {
        let cache = RateCache::default();
        cache.set(rate(Metal::Gold, dec!(6800)));

        assert_eq!(cache.get(Metal::Gold).unwrap().rate_per_gram, dec!(6800));
        assert!(cache.get(Metal::Silver).is_none());
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let cache = RateCache::default();
        cache.set(rate(Metal::Gold, dec!(6800)));
        cache.set(rate(Metal::Gold, dec!(6850)));

        assert_eq!(cache.get(Metal::Gold).unwrap().rate_per_gram, dec!(6850));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = RateCache::default();
        cache.set_with_ttl(rate(Metal::Gold, dec!(6800)), Duration::ZERO);

        assert!(cache.get(Metal::Gold).is_none());
        assert!(cache.get_all(&[Metal::Gold]).is_none());
    }

    #[test]
    fn test_get_all_requires_every_metal() {
        let cache = RateCache::default();
        cache.set(rate(Metal::Gold, dec!(6800)));
        assert!(cache.get_all(&[Metal::Gold, Metal::Silver]).is_none());

        cache.set(rate(Metal::Silver, dec!(85)));
        let rates = cache.get_all(&[Metal::Gold, Metal::Silver]).unwrap();
        assert_eq!(rates.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get_all(&[Metal::Gold]).is_none());
    }
}
