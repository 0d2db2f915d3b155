//! Service configuration
//!
//! All settings are read once at startup and injected into the components
//! that need them. Nothing downstream reads the environment on its own.

use crate::error::{AppError, Result};
use crate::pricing::PurityTable;
use crate::sources::types::Metal;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// General API requests per second
    pub api_rate_limit: u32,
    /// Manual rate refreshes per minute
    pub refresh_rate_limit: u32,
}

/// Upstream rate source settings
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    pub metals_api_key: Option<String>,
    pub metals_api_url: String,
    pub gold_api_key: Option<String>,
    pub gold_api_url: String,
    pub static_fallback_enabled: bool,
    /// INR per gram used by the static fallback source
    pub static_rates: BTreeMap<Metal, Decimal>,
    /// Metals fetched on every refresh
    pub tracked_metals: Vec<Metal>,
}

/// Rate refresh, retry and cache settings
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub attempts: u32,
    /// Linear backoff step; attempt n waits n * step
    pub backoff_step: Duration,
    pub attempt_timeout: Duration,
    pub cache_ttl: Duration,
    pub store_timeout: Duration,
    pub interval: Duration,
    /// Business hours in Asia/Kolkata
    pub business_start: NaiveTime,
    pub business_end: NaiveTime,
}

/// Price calculation defaults
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub default_wastage_pct: Decimal,
    pub default_gst_pct: Decimal,
    pub purities: PurityTable,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub server: ServerConfig,
    pub sources: SourcesConfig,
    pub refresh: RefreshConfig,
    pub pricing: PricingConfig,
}

impl AppConfig {
    /// Load configuration from the process environment (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut static_rates = BTreeMap::new();
        static_rates.insert(Metal::Gold, parse_or(&lookup, "STATIC_RATE_AU", dec!(6800))?);
        static_rates.insert(Metal::Silver, parse_or(&lookup, "STATIC_RATE_AG", dec!(85))?);
        static_rates.insert(Metal::Platinum, parse_or(&lookup, "STATIC_RATE_PT", dec!(3200))?);

        let config = Self {
            database_path: PathBuf::from(
                lookup("PRICING_DB_PATH").unwrap_or_else(|| "pricing.db".to_string()),
            ),
            server: ServerConfig {
                host: lookup("PRICING_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: parse_or(&lookup, "PRICING_PORT", 5003)?,
                api_rate_limit: parse_or(&lookup, "API_RATE_LIMIT", 50)?,
                refresh_rate_limit: parse_or(&lookup, "REFRESH_RATE_LIMIT", 6)?,
            },
            sources: SourcesConfig {
                metals_api_key: non_blank(lookup("METALS_API_KEY")),
                metals_api_url: lookup("METALS_API_URL")
                    .unwrap_or_else(|| "https://metals-api.com/api".to_string()),
                gold_api_key: non_blank(lookup("GOLD_API_KEY")),
                gold_api_url: lookup("GOLD_API_URL")
                    .unwrap_or_else(|| "https://www.goldapi.io/api".to_string()),
                static_fallback_enabled: parse_or(&lookup, "STATIC_FALLBACK_ENABLED", true)?,
                static_rates,
                tracked_metals: Metal::ALL.to_vec(),
            },
            refresh: RefreshConfig {
                attempts: parse_or(&lookup, "RATE_FETCH_ATTEMPTS", 3)?,
                backoff_step: Duration::from_millis(parse_or(&lookup, "RATE_FETCH_BACKOFF_MS", 1000)?),
                attempt_timeout: Duration::from_secs(parse_or(&lookup, "RATE_FETCH_TIMEOUT_SECS", 10)?),
                cache_ttl: Duration::from_secs(parse_or(&lookup, "RATE_CACHE_TTL_SECS", 300)?),
                store_timeout: Duration::from_millis(parse_or(&lookup, "STORE_TIMEOUT_MS", 2000)?),
                interval: Duration::from_secs(parse_or(&lookup, "RATE_REFRESH_INTERVAL_SECS", 300)?),
                business_start: parse_time(&lookup, "BUSINESS_HOURS_START", "09:00")?,
                business_end: parse_time(&lookup, "BUSINESS_HOURS_END", "21:00")?,
            },
            pricing: PricingConfig {
                default_wastage_pct: parse_or(&lookup, "DEFAULT_WASTAGE_PCT", Decimal::ZERO)?,
                default_gst_pct: parse_or(&lookup, "DEFAULT_GST_PCT", dec!(3))?,
                purities: PurityTable::standard(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.refresh.attempts == 0 {
            return Err(AppError::Config("RATE_FETCH_ATTEMPTS must be at least 1".to_string()));
        }
        if self.refresh.cache_ttl.is_zero() || self.refresh.interval.is_zero() {
            return Err(AppError::Config(
                "Cache TTL and refresh interval must be non-zero".to_string(),
            ));
        }
        if self.refresh.business_start >= self.refresh.business_end {
            return Err(AppError::Config(
                "BUSINESS_HOURS_START must be before BUSINESS_HOURS_END".to_string(),
            ));
        }
        if let Some((metal, _)) = self
            .sources
            .static_rates
            .iter()
            .find(|(_, rate)| **rate <= Decimal::ZERO)
        {
            return Err(AppError::Config(format!(
                "Static fallback rate for {} must be positive",
                metal
            )));
        }
        if self.pricing.default_wastage_pct < Decimal::ZERO
            || self.pricing.default_gst_pct < Decimal::ZERO
        {
            return Err(AppError::Config(
                "Default wastage and GST percentages cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_blank(lookup(key)) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid value for {}: {}", key, e))),
        None => Ok(default),
    }
}

fn parse_time<F>(lookup: &F, key: &str, default: &str) -> Result<NaiveTime>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = non_blank(lookup(key)).unwrap_or_else(|| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| AppError::Config(format!("Invalid value for {}: {}", key, e)))
}
