//! REST API server module
//!
//! Exposes the pricing core over HTTP/JSON for the inventory and order
//! services:
//! - Rates: current, per-purity, history, forced refresh, cache reset
//! - Pricing: single item and multi-item quotes
//! - Making-charge rules: CRUD and resolution

mod extract;
mod server;
pub mod handlers;
pub mod rate_limiter;
mod types;

pub use rate_limiter::RateLimiterState;
pub use server::{build_router, ApiServer};
pub use types::{
    ApiResponse, CurrentRatesData, DeleteRuleQuery, Empty, HealthData, HistoryEntry, HistoryQuery,
    QuoteRequest, RuleListQuery,
};
