//! Static fallback source
//!
//! Serves configured rates when every live provider is down. Quotes carry
//! the `static_fallback` source tag so consumers can tell them apart from
//! live data.

use crate::sources::types::*;
use crate::sources::RateSource;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub struct StaticFallbackSource {
    rates: BTreeMap<Metal, Decimal>,
}

impl StaticFallbackSource {
    pub fn new(rates: BTreeMap<Metal, Decimal>) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl RateSource for StaticFallbackSource {
    fn id(&self) -> &'static str {
        STATIC_FALLBACK_SOURCE
    }

    fn name(&self) -> &'static str {
        "Static fallback"
    }

    async fn fetch_rate(&self, metal: Metal) -> FetchResult<RateQuote> {
        let rate = self
            .rates
            .get(&metal)
            .ok_or_else(|| FetchError::Unconfigured(format!("No static rate for {}", metal)))?;

        RateQuote::new(metal, *rate, STATIC_FALLBACK_SOURCE)
    }
}
