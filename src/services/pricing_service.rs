//! Pricing Service
//!
//! Prices line items from the current metal rate and the applicable
//! making-charge rule. Used for single calculations and order quotes.

use super::gold_rate_service::GoldRateService;
use super::making_charges_service::MakingChargesService;
use crate::db::sqlite::models::RuleQuery;
use crate::error::{AppError, Result};
use crate::pricing::{self, PriceBreakdown, PriceInput};
use crate::sources::types::Metal;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Most line items accepted in one quote
pub const MAX_QUOTE_ITEMS: usize = 100;

/// One item to price
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRequest {
    /// Grams
    pub weight: Decimal,
    pub purity: String,
    /// Defaults to gold
    #[serde(default)]
    pub metal: Option<Metal>,
    pub category_id: Option<i64>,
    pub purity_id: Option<i64>,
    /// Defaults to the configured wastage percentage
    pub wastage_pct: Option<Decimal>,
    /// Defaults to the configured GST percentage
    pub gst_pct: Option<Decimal>,
}

/// A priced item with the inputs it was priced from
#[derive(Debug, Clone, Serialize)]
pub struct PricedItem {
    pub metal: Metal,
    pub rate_source: String,
    pub rate_recorded_at: DateTime<Utc>,
    /// The rate came from the static fallback, not a live quote
    pub static_rate: bool,
    pub rule_id: i64,
    #[serde(flatten)]
    pub breakdown: PriceBreakdown,
}

/// Several priced items with summed totals
#[derive(Debug, Clone, Serialize)]
pub struct QuoteResult {
    pub items: Vec<PricedItem>,
    pub base_price: Decimal,
    pub making_charges: Decimal,
    pub wastage_amount: Decimal,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub total_price: Decimal,
}

/// Pricing service for business logic
pub struct PricingService;

impl PricingService {
    /// Price a single item
    pub fn calculate_price(state: &AppState, request: &PriceRequest) -> Result<PricedItem> {
        let metal = request.metal.unwrap_or(Metal::Gold);
        debug!(
            "PricingService::calculate_price - {} {}g {}",
            metal, request.weight, request.purity
        );

        // Caller errors first, before touching the store
        if request.weight <= Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "weight must be positive, got {}",
                request.weight
            )));
        }
        state.config.pricing.purities.factor(&request.purity)?;

        let rate = GoldRateService::get_current_rate(state, metal)?;
        let rule = MakingChargesService::resolve(
            state,
            &RuleQuery {
                category_id: request.category_id,
                purity_id: request.purity_id,
                weight: Some(request.weight),
            },
        )?;

        let input = PriceInput {
            weight: request.weight,
            purity: request.purity.clone(),
            base_rate_per_gram: rate.rate_per_gram,
            wastage_pct: request
                .wastage_pct
                .unwrap_or(state.config.pricing.default_wastage_pct),
            gst_pct: request.gst_pct.unwrap_or(state.config.pricing.default_gst_pct),
        };
        let breakdown = pricing::calculate(&input, &rule, &state.config.pricing.purities)?;

        Ok(PricedItem {
            metal,
            static_rate: rate.is_static_fallback(),
            rate_source: rate.source,
            rate_recorded_at: rate.recorded_at,
            rule_id: rule.id,
            breakdown,
        })
    }

    /// Price several items and sum their rounded amounts
    pub fn quote_items(state: &AppState, requests: &[PriceRequest]) -> Result<QuoteResult> {
        if requests.is_empty() {
            return Err(AppError::InvalidInput("quote needs at least one item".to_string()));
        }
        if requests.len() > MAX_QUOTE_ITEMS {
            return Err(AppError::InvalidInput(format!(
                "quote cannot exceed {} items",
                MAX_QUOTE_ITEMS
            )));
        }

        let items = requests
            .iter()
            .enumerate()
            .map(|(i, request)| {
                Self::calculate_price(state, request).map_err(|e| item_error(i, e))
            })
            .collect::<Result<Vec<_>>>()?;

        let sum = |f: fn(&PriceBreakdown) -> Decimal| -> Decimal {
            items.iter().map(|item| f(&item.breakdown)).sum()
        };

        let result = QuoteResult {
            base_price: sum(|b| b.base_price),
            making_charges: sum(|b| b.making_charges),
            wastage_amount: sum(|b| b.wastage_amount),
            subtotal: sum(|b| b.subtotal),
            gst_amount: sum(|b| b.gst_amount),
            total_price: sum(|b| b.total_price),
            items,
        };

        info!(
            "PricingService::quote_items - {} items, total {}",
            result.items.len(),
            result.total_price
        );
        Ok(result)
    }
}

/// Name the failing item in caller-facing errors
fn item_error(index: usize, err: AppError) -> AppError {
    match err {
        AppError::InvalidInput(msg) => AppError::InvalidInput(format!("item {}: {}", index, msg)),
        AppError::UnknownPurity(msg) => AppError::UnknownPurity(format!("item {}: {}", index, msg)),
        AppError::RuleNotFound(msg) => AppError::RuleNotFound(format!("item {}: {}", index, msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::models::{ChargeType, NewMakingChargeRule};
    use crate::services::gold_rate_service::tests::{test_state, FakeSource};
    use rust_decimal_macros::dec;

    fn percentage_rule(rate_value: Decimal) -> NewMakingChargeRule {
        NewMakingChargeRule {
            category_id: None,
            purity_id: None,
            charge_type: ChargeType::Percentage,
            rate_value,
            minimum_charge: Decimal::ZERO,
            maximum_charge: None,
            weight_min: None,
            weight_max: None,
            effective_from: None,
            effective_to: None,
            description: None,
        }
    }

    fn request(weight: Decimal, purity: &str) -> PriceRequest {
        PriceRequest {
            weight,
            purity: purity.to_string(),
            metal: None,
            category_id: None,
            purity_id: None,
            wastage_pct: Some(dec!(2)),
            gst_pct: Some(dec!(3)),
        }
    }

    async fn priced_state() -> AppState {
        let state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        GoldRateService::update_rates(&state).await.unwrap();
        MakingChargesService::create_rule(&state, percentage_rule(dec!(12))).unwrap();
        state
    }

    #[tokio::test]
    async fn test_calculate_price_end_to_end() {
        let state = priced_state().await;

        let item = PricingService::calculate_price(&state, &request(dec!(10), "22K")).unwrap();

        assert_eq!(item.metal, Metal::Gold);
        assert_eq!(item.rate_source, "primary");
        assert!(!item.static_rate);
        assert_eq!(item.breakdown.total_price, dec!(73138.57));
    }

    #[tokio::test]
    async fn test_configured_defaults_apply() {
        let state = priced_state().await;
        let mut req = request(dec!(10), "22K");
        req.wastage_pct = None;
        req.gst_pct = None;

        let item = PricingService::calculate_price(&state, &req).unwrap();

        // default wastage 0%, GST 3%
        assert_eq!(item.breakdown.wastage_amount, Decimal::ZERO);
        assert_eq!(item.breakdown.subtotal, dec!(69762.56));
        assert_eq!(item.breakdown.gst_amount, dec!(2092.88));
    }

    #[tokio::test]
    async fn test_caller_errors() {
        let state = priced_state().await;

        assert!(matches!(
            PricingService::calculate_price(&state, &request(dec!(-5), "22K")),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            PricingService::calculate_price(&state, &request(dec!(10), "25K")),
            Err(AppError::UnknownPurity(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_rule_and_missing_rate() {
        let state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        assert!(matches!(
            PricingService::calculate_price(&state, &request(dec!(10), "22K")),
            Err(AppError::Unavailable(_))
        ));

        GoldRateService::update_rates(&state).await.unwrap();
        assert!(matches!(
            PricingService::calculate_price(&state, &request(dec!(10), "22K")),
            Err(AppError::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_quote_sums_items() {
        let state = priced_state().await;
        let items = vec![request(dec!(10), "22K"), request(dec!(5), "24K")];

        let quote = PricingService::quote_items(&state, &items).unwrap();

        assert_eq!(quote.items.len(), 2);
        let expected: Decimal = quote.items.iter().map(|i| i.breakdown.total_price).sum();
        assert_eq!(quote.total_price, expected);
        assert_eq!(quote.items[0].breakdown.total_price, dec!(73138.57));

        assert!(matches!(
            PricingService::quote_items(&state, &[]),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_quote_errors_name_the_item() {
        let state = priced_state().await;

        let items = vec![request(dec!(10), "22K"), request(dec!(5), "25K")];
        match PricingService::quote_items(&state, &items) {
            Err(AppError::UnknownPurity(msg)) => assert!(msg.starts_with("item 1:"), "{}", msg),
            other => panic!("expected UnknownPurity, got {:?}", other.map(|q| q.items.len())),
        }

        let items = vec![request(dec!(0), "22K")];
        match PricingService::quote_items(&state, &items) {
            Err(AppError::InvalidInput(msg)) => assert!(msg.starts_with("item 0:"), "{}", msg),
            other => panic!("expected InvalidInput, got {:?}", other.map(|q| q.items.len())),
        }
    }

    #[tokio::test]
    async fn test_quote_missing_rule_names_the_item() {
        let state = test_state(vec![FakeSource::new("primary", Ok(dec!(6800)))]);
        GoldRateService::update_rates(&state).await.unwrap();

        match PricingService::quote_items(&state, &[request(dec!(10), "22K")]) {
            Err(AppError::RuleNotFound(msg)) => assert!(msg.starts_with("item 0:"), "{}", msg),
            other => panic!("expected RuleNotFound, got {:?}", other.map(|q| q.items.len())),
        }
    }
}
