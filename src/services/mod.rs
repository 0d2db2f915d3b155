//! Services Layer
//!
//! Business logic shared by the REST API handlers and the background
//! scheduler. Handlers stay thin and call into these services.
//!
//! # Architecture
//!
//! ```text
//! REST API ──────┐
//!                ├──> Services --> Rate sources / Cache / SQLite
//! Scheduler ─────┘
//! ```
//!
//! # Services
//!
//! - `GoldRateService` - Rate refresh with fallback, cache-first reads, history
//! - `MakingChargesService` - Making-charge rule CRUD and resolution
//! - `PricingService` - Price breakdowns and multi-item quotes

pub mod gold_rate_service;
pub mod making_charges_service;
pub mod pricing_service;

// Re-export commonly used types and services
pub use gold_rate_service::{GoldRateService, PurityRate, RateSnapshot, RefreshResult};
pub use making_charges_service::MakingChargesService;
pub use pricing_service::{PriceRequest, PricedItem, PricingService, QuoteResult};
