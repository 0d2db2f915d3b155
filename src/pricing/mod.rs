//! Price calculation
//!
//! Pure functions only. Rates and rules are looked up by the pricing
//! service and passed in.

pub mod calculator;
pub mod purity;

pub use calculator::{calculate, making_charges, PriceBreakdown, PriceInput};
pub use purity::{PurityEntry, PurityTable};
