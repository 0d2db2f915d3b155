//! Making Charges Service
//!
//! Rule CRUD and resolution of the single applicable rule for an item.

use crate::db::sqlite::models::{
    MakingChargeRule, MakingChargeRuleUpdate, NewMakingChargeRule, RuleQuery,
};
use crate::error::{AppError, Result};
use crate::state::AppState;
use chrono::Utc;
use tracing::info;

/// Making charges service for business logic
pub struct MakingChargesService;

impl MakingChargesService {
    pub fn list_rules(state: &AppState, include_inactive: bool) -> Result<Vec<MakingChargeRule>> {
        state.sqlite.list_rules(include_inactive)
    }

    pub fn get_rule(state: &AppState, id: i64) -> Result<MakingChargeRule> {
        state
            .sqlite
            .get_rule(id)?
            .ok_or_else(|| AppError::NotFound(format!("Making-charge rule {}", id)))
    }

    pub fn create_rule(state: &AppState, rule: NewMakingChargeRule) -> Result<MakingChargeRule> {
        info!(
            "MakingChargesService::create_rule - category {:?}, purity {:?}",
            rule.category_id, rule.purity_id
        );
        state.sqlite.create_rule(rule)
    }

    pub fn update_rule(
        state: &AppState,
        id: i64,
        update: MakingChargeRuleUpdate,
    ) -> Result<MakingChargeRule> {
        info!("MakingChargesService::update_rule - {}", id);
        state.sqlite.update_rule(id, update)
    }

    /// Soft delete: the rule stays in the table but never resolves again
    pub fn deactivate_rule(state: &AppState, id: i64) -> Result<MakingChargeRule> {
        Self::update_rule(
            state,
            id,
            MakingChargeRuleUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
    }

    /// Hard delete
    pub fn delete_rule(state: &AppState, id: i64) -> Result<()> {
        info!("MakingChargesService::delete_rule - {}", id);
        if state.sqlite.delete_rule(id)? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Making-charge rule {}", id)))
        }
    }

    /// The one rule in force for this category/purity/weight.
    ///
    /// Precedence is exact match, category-only, purity-only, generic.
    pub fn resolve(state: &AppState, query: &RuleQuery) -> Result<MakingChargeRule> {
        state.sqlite.resolve_rule(query, Utc::now())?.ok_or_else(|| {
            AppError::RuleNotFound(format!(
                "category {:?}, purity {:?}",
                query.category_id, query.purity_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::models::ChargeType;
    use crate::services::gold_rate_service::tests::test_state;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn new_rule(category_id: Option<i64>, purity_id: Option<i64>) -> NewMakingChargeRule {
        NewMakingChargeRule {
            category_id,
            purity_id,
            charge_type: ChargeType::Percentage,
            rate_value: dec!(12),
            minimum_charge: Decimal::ZERO,
            maximum_charge: None,
            weight_min: None,
            weight_max: None,
            effective_from: None,
            effective_to: None,
            description: None,
        }
    }

    #[test]
    fn test_resolve_without_rules_is_rule_not_found() {
        let state = test_state(vec![]);
        let result = MakingChargesService::resolve(&state, &RuleQuery::default());
        assert!(matches!(result, Err(AppError::RuleNotFound(_))));
    }

    #[test]
    fn test_deactivated_rule_no_longer_resolves() {
        let state = test_state(vec![]);
        let specific = MakingChargesService::create_rule(&state, new_rule(Some(1), Some(2))).unwrap();
        let generic = MakingChargesService::create_rule(&state, new_rule(None, None)).unwrap();

        let query = RuleQuery {
            category_id: Some(1),
            purity_id: Some(2),
            weight: None,
        };
        assert_eq!(MakingChargesService::resolve(&state, &query).unwrap().id, specific.id);

        let deactivated = MakingChargesService::deactivate_rule(&state, specific.id).unwrap();
        assert!(!deactivated.is_active);
        assert_eq!(MakingChargesService::resolve(&state, &query).unwrap().id, generic.id);
        assert_eq!(MakingChargesService::list_rules(&state, false).unwrap().len(), 1);
        assert_eq!(MakingChargesService::list_rules(&state, true).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_rule_is_not_found() {
        let state = test_state(vec![]);
        assert!(matches!(
            MakingChargesService::get_rule(&state, 42),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            MakingChargesService::delete_rule(&state, 42),
            Err(AppError::NotFound(_))
        ));
    }
}
