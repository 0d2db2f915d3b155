//! Common rate source types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Grams in one troy ounce
pub const TROY_OUNCE_GRAMS: Decimal = dec!(31.1035);

/// Source tag written for rates that did not come from a live quote
pub const STATIC_FALLBACK_SOURCE: &str = "static_fallback";

/// Tracked precious metals, keyed by their short symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metal {
    #[serde(rename = "AU")]
    Gold,
    #[serde(rename = "AG")]
    Silver,
    #[serde(rename = "PT")]
    Platinum,
}

impl Metal {
    pub const ALL: [Metal; 3] = [Metal::Gold, Metal::Silver, Metal::Platinum];

    /// Short symbol stored in the database (AU, AG, PT)
    pub fn symbol(&self) -> &'static str {
        match self {
            Metal::Gold => "AU",
            Metal::Silver => "AG",
            Metal::Platinum => "PT",
        }
    }

    /// ISO 4217 commodity code used by quote providers
    pub fn iso_code(&self) -> &'static str {
        match self {
            Metal::Gold => "XAU",
            Metal::Silver => "XAG",
            Metal::Platinum => "XPT",
        }
    }
}

impl fmt::Display for Metal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Metal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AU" | "XAU" | "GOLD" => Ok(Metal::Gold),
            "AG" | "XAG" | "SILVER" => Ok(Metal::Silver),
            "PT" | "XPT" | "PLATINUM" => Ok(Metal::Platinum),
            other => Err(format!("Unknown metal symbol: {}", other)),
        }
    }
}

/// Failure of a single rate fetch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Missing or rejected credentials; retrying cannot help
    #[error("source not configured: {0}")]
    Unconfigured(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Unconfigured(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::MalformedResponse(err.to_string())
        } else {
            FetchError::Unavailable(err.to_string())
        }
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// A normalized quote: INR per gram of pure metal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub metal: Metal,
    pub rate_per_gram: Decimal,
    pub source: String,
    pub quoted_at: DateTime<Utc>,
}

impl RateQuote {
    /// Build a quote, rejecting non-positive rates
    pub fn new(metal: Metal, rate_per_gram: Decimal, source: &str) -> FetchResult<Self> {
        if rate_per_gram <= Decimal::ZERO {
            return Err(FetchError::MalformedResponse(format!(
                "{} returned non-positive rate {} for {}",
                source, rate_per_gram, metal
            )));
        }

        Ok(Self {
            metal,
            rate_per_gram,
            source: source.to_string(),
            quoted_at: Utc::now(),
        })
    }
}

/// A persisted rate history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalRate {
    pub symbol: Metal,
    pub rate_per_gram: Decimal,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

impl MetalRate {
    pub fn is_static_fallback(&self) -> bool {
        self.source == STATIC_FALLBACK_SOURCE
    }
}

impl From<RateQuote> for MetalRate {
    fn from(quote: RateQuote) -> Self {
        Self {
            symbol: quote.metal,
            rate_per_gram: quote.rate_per_gram,
            source: quote.source,
            recorded_at: quote.quoted_at,
        }
    }
}

/// Convert an INR per troy ounce price to INR per gram
pub fn per_ounce_to_per_gram(price_per_ounce: Decimal) -> Decimal {
    (price_per_ounce / TROY_OUNCE_GRAMS).round_dp(4)
}

/// Read a JSON number (or numeric string) as a decimal from its text form,
/// without a trip through `f64`
pub fn json_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
