//! Purity label -> fraction of pure metal

use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// One row of the purity table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurityEntry {
    pub label: String,
    pub factor: Decimal,
}

/// Immutable purity reference table
#[derive(Debug, Clone, PartialEq)]
pub struct PurityTable {
    entries: Vec<PurityEntry>,
}

impl PurityTable {
    /// Karat labels for gold plus fineness labels for silver and platinum
    pub fn standard() -> Self {
        Self::from_pairs(&[
            ("24K", dec!(1.0)),
            ("22K", dec!(0.916)),
            ("18K", dec!(0.75)),
            ("14K", dec!(0.583)),
            ("10K", dec!(0.417)),
            ("999", dec!(0.999)),
            ("950", dec!(0.95)),
            ("925", dec!(0.925)),
        ])
    }

    pub fn from_pairs(pairs: &[(&str, Decimal)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(label, factor)| PurityEntry {
                    label: normalize(label),
                    factor: *factor,
                })
                .collect(),
        }
    }

    /// Purity factor for a label; lookup ignores case and surrounding space
    pub fn factor(&self, label: &str) -> Result<Decimal> {
        let key = normalize(label);
        self.entries
            .iter()
            .find(|e| e.label == key)
            .map(|e| e.factor)
            .ok_or_else(|| AppError::UnknownPurity(label.trim().to_string()))
    }

    pub fn entries(&self) -> &[PurityEntry] {
        &self.entries
    }

    /// Labels that apply to gold (karat labels)
    pub fn karat_entries(&self) -> impl Iterator<Item = &PurityEntry> {
        self.entries.iter().filter(|e| e.label.ends_with('K'))
    }
}

impl Default for PurityTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_uppercase()
}
