//! SQLite database models

use super::to_db_precision;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a making charge is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    /// Percentage of the metal value
    Percentage,
    /// Flat amount per gram
    PerGram,
    /// Flat amount per piece
    Fixed,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Percentage => "percentage",
            ChargeType::PerGram => "per_gram",
            ChargeType::Fixed => "fixed",
        }
    }
}

impl fmt::Display for ChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(ChargeType::Percentage),
            "per_gram" => Ok(ChargeType::PerGram),
            "fixed" => Ok(ChargeType::Fixed),
            other => Err(format!("Unknown charge type: {}", other)),
        }
    }
}

/// Making-charge rule model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakingChargeRule {
    pub id: i64,
    pub category_id: Option<i64>,
    pub purity_id: Option<i64>,
    pub charge_type: ChargeType,
    pub rate_value: Decimal,
    pub minimum_charge: Decimal,
    pub maximum_charge: Option<Decimal>,
    pub weight_min: Option<Decimal>,
    pub weight_max: Option<Decimal>,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub description: Option<String>,
}

impl MakingChargeRule {
    /// Check rule invariants
    pub fn validate(&self) -> Result<()> {
        if self.rate_value < Decimal::ZERO {
            return Err(AppError::InvalidInput("rate_value cannot be negative".to_string()));
        }
        if self.minimum_charge < Decimal::ZERO {
            return Err(AppError::InvalidInput("minimum_charge cannot be negative".to_string()));
        }
        if let Some(max) = self.maximum_charge {
            if max < self.minimum_charge {
                return Err(AppError::InvalidInput(
                    "maximum_charge must be at least minimum_charge".to_string(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.weight_min, self.weight_max) {
            if min > max {
                return Err(AppError::InvalidInput(
                    "weight_min cannot exceed weight_max".to_string(),
                ));
            }
        }
        if self.weight_min.is_some_and(|w| w < Decimal::ZERO) {
            return Err(AppError::InvalidInput("weight_min cannot be negative".to_string()));
        }
        if let Some(to) = self.effective_to {
            if to <= self.effective_from {
                return Err(AppError::InvalidInput(
                    "effective_to must be after effective_from".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether `weight` falls inside the rule's weight range (if any)
    pub fn matches_weight(&self, weight: Decimal) -> bool {
        self.weight_min.map_or(true, |min| weight >= min)
            && self.weight_max.map_or(true, |max| weight <= max)
    }
}

/// Create request for a making-charge rule
#[derive(Debug, Clone, Deserialize)]
pub struct NewMakingChargeRule {
    pub category_id: Option<i64>,
    pub purity_id: Option<i64>,
    pub charge_type: ChargeType,
    pub rate_value: Decimal,
    #[serde(default)]
    pub minimum_charge: Decimal,
    pub maximum_charge: Option<Decimal>,
    pub weight_min: Option<Decimal>,
    pub weight_max: Option<Decimal>,
    /// Defaults to now
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl NewMakingChargeRule {
    /// Materialize into a rule with the given id
    pub fn into_rule(self, id: i64, now: DateTime<Utc>) -> MakingChargeRule {
        MakingChargeRule {
            id,
            category_id: self.category_id,
            purity_id: self.purity_id,
            charge_type: self.charge_type,
            rate_value: self.rate_value,
            minimum_charge: self.minimum_charge,
            maximum_charge: self.maximum_charge,
            weight_min: self.weight_min,
            weight_max: self.weight_max,
            effective_from: to_db_precision(self.effective_from.unwrap_or(now)),
            effective_to: self.effective_to.map(to_db_precision),
            is_active: true,
            description: self.description,
        }
    }
}

/// Partial update for a making-charge rule.
///
/// Outer `None` leaves a field unchanged. For nullable columns,
/// `Some(None)` (JSON `null`) clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MakingChargeRuleUpdate {
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub purity_id: Option<Option<i64>>,
    pub charge_type: Option<ChargeType>,
    pub rate_value: Option<Decimal>,
    pub minimum_charge: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub maximum_charge: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    pub weight_min: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    pub weight_max: Option<Option<Decimal>>,
    pub effective_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub effective_to: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

impl MakingChargeRuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.category_id.is_none()
            && self.purity_id.is_none()
            && self.charge_type.is_none()
            && self.rate_value.is_none()
            && self.minimum_charge.is_none()
            && self.maximum_charge.is_none()
            && self.weight_min.is_none()
            && self.weight_max.is_none()
            && self.effective_from.is_none()
            && self.effective_to.is_none()
            && self.is_active.is_none()
            && self.description.is_none()
    }

    /// Apply the set fields onto an existing rule
    pub fn apply_to(self, rule: &mut MakingChargeRule) {
        if let Some(v) = self.category_id {
            rule.category_id = v;
        }
        if let Some(v) = self.purity_id {
            rule.purity_id = v;
        }
        if let Some(v) = self.charge_type {
            rule.charge_type = v;
        }
        if let Some(v) = self.rate_value {
            rule.rate_value = v;
        }
        if let Some(v) = self.minimum_charge {
            rule.minimum_charge = v;
        }
        if let Some(v) = self.maximum_charge {
            rule.maximum_charge = v;
        }
        if let Some(v) = self.weight_min {
            rule.weight_min = v;
        }
        if let Some(v) = self.weight_max {
            rule.weight_max = v;
        }
        if let Some(v) = self.effective_from {
            rule.effective_from = to_db_precision(v);
        }
        if let Some(v) = self.effective_to {
            rule.effective_to = v.map(to_db_precision);
        }
        if let Some(v) = self.is_active {
            rule.is_active = v;
        }
        if let Some(v) = self.description {
            rule.description = v;
        }
    }
}

/// Lookup key for rule resolution
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleQuery {
    pub category_id: Option<i64>,
    pub purity_id: Option<i64>,
    pub weight: Option<Decimal>,
}

fn nullable<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
