//! Scheduler module
//!
//! Handles scheduled tasks:
//! - Metal rate refresh at startup and every few minutes during business hours (IST)

mod rate_refresh;

pub use rate_refresh::{is_business_hours, RateRefreshScheduler};
