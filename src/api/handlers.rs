//! REST API endpoint handlers
//!
//! Thin wrappers over the services layer. Errors render through
//! `AppError`'s `IntoResponse`.

use crate::api::types::*;
use crate::db::sqlite::models::{
    MakingChargeRule, MakingChargeRuleUpdate, NewMakingChargeRule, RuleQuery,
};
use crate::error::{AppError, Result};
use crate::pricing::PurityEntry;
use crate::services::{
    GoldRateService, MakingChargesService, PricedItem, PricingService, PriceRequest, PurityRate,
    QuoteResult, RefreshResult,
};
use crate::sources::types::Metal;
use crate::state::AppState;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::info;

type ApiResult<T> = Result<Json<ApiResponse<T>>>;

const DEFAULT_HISTORY_DAYS: i64 = 7;

// ============================================================================
// Health Check
// ============================================================================

/// Health check endpoint - GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let data = HealthData {
        service: "jewel-pricing".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sources: state.sources.list().iter().map(|s| s.id().to_string()).collect(),
        cached_rates: state.rate_cache.len(),
        last_refresh: state.get_last_refresh(),
    };
    Json(ApiResponse::success_with_data(data).with_message("Pricing service is running"))
}

// ============================================================================
// Rates
// ============================================================================

/// Current rates - GET /api/v1/rates/current
pub async fn get_current_rates(State(state): State<Arc<AppState>>) -> ApiResult<CurrentRatesData> {
    let snapshot = GoldRateService::get_current_rates(&state)?;

    let data = CurrentRatesData {
        rates: snapshot
            .rates
            .iter()
            .map(|(metal, rate)| (*metal, rate.rate_per_gram))
            .collect(),
        details: snapshot.rates.into_values().collect(),
        from_cache: snapshot.from_cache,
        static_fallback: snapshot.static_fallback,
    };

    let response = ApiResponse::success_with_data(data);
    Ok(Json(if response.data.as_ref().is_some_and(|d| d.static_fallback) {
        response.with_message("Rates include static fallback values, not live quotes")
    } else {
        response
    }))
}

/// Gold rate per karat - GET /api/v1/rates/purity
pub async fn get_purity_rates(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PurityRate>> {
    let rates = GoldRateService::purity_rates(&state)?;
    Ok(Json(ApiResponse::success_with_data(rates)))
}

/// Rate history - GET /api/v1/rates/history?days=7&symbol=AU
pub async fn get_rate_history(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Vec<HistoryEntry>> {
    let metal = query
        .symbol
        .as_deref()
        .map(str::parse::<Metal>)
        .transpose()
        .map_err(AppError::InvalidInput)?;
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);

    let history = GoldRateService::get_rate_history(&state, days, metal)?;
    Ok(Json(ApiResponse::success_with_data(
        history.into_iter().map(HistoryEntry::from).collect(),
    )))
}

/// Forced refresh - POST /api/v1/rates/refresh
///
/// Unlike the scheduler, failures are returned to the caller (503).
pub async fn refresh_rates(State(state): State<Arc<AppState>>) -> ApiResult<RefreshResult> {
    info!("Manual rate refresh requested");
    let result = GoldRateService::update_rates(&state).await?;
    Ok(Json(ApiResponse::success_with_data(result)))
}

/// Drop cached rates - DELETE /api/v1/rates/cache
pub async fn invalidate_cache(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Empty>> {
    GoldRateService::invalidate_cache(&state);
    Json(ApiResponse::success_with_message("Rate cache cleared"))
}

// ============================================================================
// Pricing
// ============================================================================

/// Price one item - POST /api/v1/pricing/calculate
pub async fn calculate_price(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PriceRequest>,
) -> ApiResult<PricedItem> {
    let item = PricingService::calculate_price(&state, &req)?;
    Ok(Json(ApiResponse::success_with_data(item)))
}

/// Price several items - POST /api/v1/pricing/quote
pub async fn quote(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<QuoteRequest>,
) -> ApiResult<QuoteResult> {
    let quote = PricingService::quote_items(&state, &req.items)?;
    Ok(Json(ApiResponse::success_with_data(quote)))
}

/// Purity table - GET /api/v1/purities
pub async fn list_purities(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<PurityEntry>>> {
    Json(ApiResponse::success_with_data(
        state.config.pricing.purities.entries().to_vec(),
    ))
}

// ============================================================================
// Making Charges
// ============================================================================

/// GET /api/v1/making-charges?include_inactive=true
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<RuleListQuery>,
) -> ApiResult<Vec<MakingChargeRule>> {
    let rules = MakingChargesService::list_rules(&state, query.include_inactive)?;
    Ok(Json(ApiResponse::success_with_data(rules)))
}

/// POST /api/v1/making-charges
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<NewMakingChargeRule>,
) -> Result<(StatusCode, Json<ApiResponse<MakingChargeRule>>)> {
    let rule = MakingChargesService::create_rule(&state, req)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success_with_data(rule))))
}

/// GET /api/v1/making-charges/:id
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<MakingChargeRule> {
    let rule = MakingChargesService::get_rule(&state, id)?;
    Ok(Json(ApiResponse::success_with_data(rule)))
}

/// PUT /api/v1/making-charges/:id
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<MakingChargeRuleUpdate>,
) -> ApiResult<MakingChargeRule> {
    let rule = MakingChargesService::update_rule(&state, id, req)?;
    Ok(Json(ApiResponse::success_with_data(rule)))
}

/// DELETE /api/v1/making-charges/:id (`?hard=true` removes the row)
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<DeleteRuleQuery>,
) -> ApiResult<Empty> {
    if query.hard {
        MakingChargesService::delete_rule(&state, id)?;
        Ok(Json(ApiResponse::success_with_message("Making-charge rule deleted")))
    } else {
        MakingChargesService::deactivate_rule(&state, id)?;
        Ok(Json(ApiResponse::success_with_message("Making-charge rule deactivated")))
    }
}

/// GET /api/v1/making-charges/resolve?category_id=1&purity_id=2&weight=10
pub async fn resolve_rule(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<RuleQuery>,
) -> ApiResult<MakingChargeRule> {
    let rule = MakingChargesService::resolve(&state, &query)?;
    Ok(Json(ApiResponse::success_with_data(rule)))
}
