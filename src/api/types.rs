//! REST API types

use crate::services::PriceRequest;
use crate::sources::types::{Metal, MetalRate};
use crate::state::RefreshStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Common Types
// ============================================================================

/// Standard API response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success_with_message(message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn success_with_data(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

/// Empty data type for responses without data
#[derive(Debug, Clone, Serialize)]
pub struct Empty {}

// ============================================================================
// Request Types
// ============================================================================

/// Query for GET /api/v1/rates/history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// Defaults to 7
    pub days: Option<i64>,
    /// AU, AG or PT; all metals when absent
    pub symbol: Option<String>,
}

/// Body for POST /api/v1/pricing/quote
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<PriceRequest>,
}

/// Query for GET /api/v1/making-charges
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Query for DELETE /api/v1/making-charges/:id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteRuleQuery {
    /// Remove the row instead of deactivating it
    #[serde(default)]
    pub hard: bool,
}

// ============================================================================
// Response Data Types
// ============================================================================

/// Health check payload
#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    pub service: String,
    pub version: String,
    pub sources: Vec<String>,
    pub cached_rates: usize,
    pub last_refresh: Option<RefreshStatus>,
}

/// Current rates: symbol -> INR per gram, with per-rate details
#[derive(Debug, Clone, Serialize)]
pub struct CurrentRatesData {
    pub rates: BTreeMap<Metal, Decimal>,
    pub details: Vec<MetalRate>,
    pub from_cache: bool,
    pub static_fallback: bool,
}

/// One history row
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub symbol: Metal,
    pub rate: Decimal,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<MetalRate> for HistoryEntry {
    fn from(rate: MetalRate) -> Self {
        Self {
            symbol: rate.symbol,
            rate: rate.rate_per_gram,
            source: rate.source,
            recorded_at: rate.recorded_at,
        }
    }
}
