//! Price breakdown calculation
//!
//! Order of operations:
//! 1. purity factor from the table
//! 2. adjusted rate = base rate * purity factor
//! 3. base price = adjusted rate * weight
//! 4. making charges per rule, clamped to [minimum, maximum]
//! 5. wastage = base price * wastage% / 100
//! 6. subtotal = base + making + wastage
//! 7. GST = subtotal * gst% / 100
//! 8. total = subtotal + GST
//!
//! Everything is carried at full precision and rounded to 2 dp only when
//! the breakdown is assembled.

use super::purity::PurityTable;
use crate::db::sqlite::models::{ChargeType, MakingChargeRule};
use crate::error::{AppError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

const HUNDRED: Decimal = dec!(100);

/// Inputs for one line item
#[derive(Debug, Clone, PartialEq)]
pub struct PriceInput {
    /// Grams
    pub weight: Decimal,
    pub purity: String,
    /// INR per gram of pure metal
    pub base_rate_per_gram: Decimal,
    pub wastage_pct: Decimal,
    pub gst_pct: Decimal,
}

/// Computed price breakdown; monetary fields are rounded to 2 dp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub purity: String,
    pub purity_factor: Decimal,
    pub weight: Decimal,
    pub rate_per_gram: Decimal,
    pub adjusted_rate: Decimal,
    pub charge_type: ChargeType,
    pub base_price: Decimal,
    pub making_charges: Decimal,
    pub wastage_amount: Decimal,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub total_price: Decimal,
}

/// Reject inputs that cannot produce a meaningful price
pub fn validate(input: &PriceInput) -> Result<()> {
    if input.weight <= Decimal::ZERO {
        return Err(AppError::InvalidInput(format!(
            "weight must be positive, got {}",
            input.weight
        )));
    }
    if input.base_rate_per_gram <= Decimal::ZERO {
        return Err(AppError::InvalidInput(format!(
            "rate per gram must be positive, got {}",
            input.base_rate_per_gram
        )));
    }
    if input.wastage_pct < Decimal::ZERO {
        return Err(AppError::InvalidInput("wastage percentage cannot be negative".to_string()));
    }
    if input.gst_pct < Decimal::ZERO {
        return Err(AppError::InvalidInput("GST percentage cannot be negative".to_string()));
    }
    Ok(())
}

/// Making charges for a rule, clamped to the rule's bounds. Unrounded.
pub fn making_charges(
    rule: &MakingChargeRule,
    base_price: Decimal,
    weight: Decimal,
) -> Result<Decimal> {
    let raw = match rule.charge_type {
        ChargeType::Percentage => mul(base_price, rule.rate_value)? / HUNDRED,
        ChargeType::PerGram => mul(rule.rate_value, weight)?,
        ChargeType::Fixed => rule.rate_value,
    };

    let clamped = raw.max(rule.minimum_charge);
    Ok(match rule.maximum_charge {
        Some(max) => clamped.min(max),
        None => clamped,
    })
}

/// Compute a full price breakdown
pub fn calculate(
    input: &PriceInput,
    rule: &MakingChargeRule,
    purities: &PurityTable,
) -> Result<PriceBreakdown> {
    validate(input)?;

    let purity_factor = purities.factor(&input.purity)?;
    let adjusted_rate = mul(input.base_rate_per_gram, purity_factor)?;
    let base_price = mul(adjusted_rate, input.weight)?;
    let making = making_charges(rule, base_price, input.weight)?;
    let wastage_amount = mul(base_price, input.wastage_pct)? / HUNDRED;
    let subtotal = add(add(base_price, making)?, wastage_amount)?;
    let gst_amount = mul(subtotal, input.gst_pct)? / HUNDRED;
    let total_price = add(subtotal, gst_amount)?;

    Ok(PriceBreakdown {
        purity: input.purity.trim().to_uppercase(),
        purity_factor,
        weight: input.weight,
        rate_per_gram: round_money(input.base_rate_per_gram),
        adjusted_rate: round_money(adjusted_rate),
        charge_type: rule.charge_type,
        base_price: round_money(base_price),
        making_charges: round_money(making),
        wastage_amount: round_money(wastage_amount),
        subtotal: round_money(subtotal),
        gst_amount: round_money(gst_amount),
        total_price: round_money(total_price),
    })
}

/// Round half away from zero to 2 dp
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| AppError::InvalidInput("amount out of range".to_string()))
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| AppError::InvalidInput("amount out of range".to_string()))
}
