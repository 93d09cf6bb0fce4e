use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::model::{
    Balance, BankDetails, ProductRateOverride, ShopAccount, ShopCredentials, Transaction,
    WithdrawalRequest,
};
use crate::rates::{to_percent, validate_override, validate_shop};
use crate::reconciler::{OrderOutcome, ReviewOutcome, WebhookEvent, WebhookOutcome};
use crate::storage::ShopStore;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub(super) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Webhooks
// ============================================================================

pub(super) async fn webhook(
    State(state): State<AppState>,
    payload: Result<Json<WebhookEvent>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(event) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let outcome = state.reconciler.handle(event).await?;
    Ok(Json(outcome_body(&outcome)))
}

fn outcome_body(outcome: &WebhookOutcome) -> Value {
    match outcome {
        WebhookOutcome::Review(ReviewOutcome::Recorded {
            referral_code,
            review_id,
            account_id,
        }) => json!({
            "outcome": outcome.as_str(),
            "referral_code": referral_code,
            "review_id": review_id,
            "account_id": account_id,
        }),
        WebhookOutcome::Order(OrderOutcome::Credited {
            transaction_ids,
            total_reward,
        }) => json!({
            "outcome": outcome.as_str(),
            "transaction_ids": transaction_ids,
            "total_reward": total_reward,
        }),
        WebhookOutcome::Uninstalled { deactivated } => json!({
            "outcome": outcome.as_str(),
            "deactivated": deactivated,
        }),
        other => json!({ "reason": other.as_str() }),
    }
}

// ============================================================================
// Rates and clicks
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct RateParams {
    shop_id: String,
    product_id: Option<String>,
    order_amount: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct RateResponse {
    reviewer_percent: f64,
    buyer_percent: f64,
    platform_fee_percent: f64,
    source: &'static str,
}

/// Always answers; unusable parameters resolve as an unknown shop.
pub(super) async fn rates(
    State(state): State<AppState>,
    params: Result<Query<RateParams>, QueryRejection>,
) -> Json<RateResponse> {
    let params = params.map(|Query(p)| p).unwrap_or_default();
    let resolved = state
        .reconciler
        .calculator()
        .resolver()
        .resolve_rates(
            &params.shop_id,
            params.product_id.as_deref().filter(|p| !p.is_empty()),
            params.order_amount,
        )
        .await;

    Json(RateResponse {
        reviewer_percent: to_percent(resolved.rates.reviewer),
        buyer_percent: to_percent(resolved.rates.buyer),
        platform_fee_percent: to_percent(resolved.rates.platform_fee),
        source: resolved.source.as_str(),
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct ClickRequest {
    referral_code: String,
}

pub(super) async fn track_click(
    State(state): State<AppState>,
    payload: Result<Json<ClickRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let click_count = state
        .reconciler
        .registry()
        .track_click(&req.referral_code)
        .await?;
    Ok(Json(json!({ "click_count": click_count })))
}

// ============================================================================
// Withdrawals and accounts
// ============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct WithdrawalBody {
    account_id: Uuid,
    amount: i64,
    #[serde(default)]
    bank_details: BankDetails,
}

#[derive(Debug, Serialize)]
pub(super) struct WithdrawalResponse {
    withdrawal_id: Uuid,
    account_id: Uuid,
    amount: i64,
    status: &'static str,
}

impl From<WithdrawalRequest> for WithdrawalResponse {
    fn from(w: WithdrawalRequest) -> Self {
        Self {
            withdrawal_id: w.id,
            account_id: w.account_id,
            amount: w.amount,
            status: w.status.as_str(),
        }
    }
}

pub(super) async fn request_withdrawal(
    State(state): State<AppState>,
    payload: Result<Json<WithdrawalBody>, JsonRejection>,
) -> Result<(StatusCode, Json<WithdrawalResponse>), ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = state
        .reconciler
        .ledger()
        .request_withdrawal(body.account_id, body.amount, body.bank_details)
        .await?;
    Ok((StatusCode::CREATED, Json(request.into())))
}

pub(super) async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WithdrawalResponse> {
    let settled = state.reconciler.ledger().approve_withdrawal(id).await?;
    Ok(Json(settled.into()))
}

pub(super) async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WithdrawalResponse> {
    let settled = state.reconciler.ledger().reject_withdrawal(id).await?;
    Ok(Json(settled.into()))
}

pub(super) async fn balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Balance> {
    Ok(Json(state.reconciler.ledger().balance(id).await?))
}

pub(super) async fn transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Transaction>> {
    Ok(Json(state.reconciler.ledger().list_transactions(id).await?))
}

// ============================================================================
// Shop administration
// ============================================================================

/// Fields an administrator may set. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ShopSettings {
    reviewer_rate: Option<f64>,
    buyer_rate: Option<f64>,
    platform_fee_rate: Option<f64>,
    prepaid_balance: Option<i64>,
    min_balance_threshold: Option<i64>,
    active: Option<bool>,
    credentials: Option<ShopCredentials>,
}

pub(super) async fn upsert_shop(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    payload: Result<Json<ShopSettings>, JsonRejection>,
) -> ApiResult<ShopAccount> {
    let Json(settings) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut shop = state
        .shops
        .get_shop(&shop_id)
        .await?
        .unwrap_or_else(|| ShopAccount::new(shop_id.clone()));

    if settings.reviewer_rate.is_some() {
        shop.reviewer_rate = settings.reviewer_rate;
    }
    if settings.buyer_rate.is_some() {
        shop.buyer_rate = settings.buyer_rate;
    }
    if settings.platform_fee_rate.is_some() {
        shop.platform_fee_rate = settings.platform_fee_rate;
    }
    if let Some(balance) = settings.prepaid_balance {
        shop.prepaid_balance = balance;
    }
    if let Some(threshold) = settings.min_balance_threshold {
        shop.min_balance_threshold = threshold;
    }
    if let Some(active) = settings.active {
        shop.active = active;
    }
    if let Some(credentials) = settings.credentials {
        shop.credentials = credentials;
    }

    validate_shop(&shop)?;
    state.shops.upsert_shop(&shop).await?;

    // Tokens stay server-side.
    shop.credentials = ShopCredentials::default();
    Ok(Json(shop))
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductRates {
    reviewer_rate: f64,
    buyer_rate: f64,
    platform_fee_rate: f64,
    #[serde(default = "enabled")]
    active: bool,
}

fn enabled() -> bool {
    true
}

pub(super) async fn set_product_rates(
    State(state): State<AppState>,
    Path((shop_id, product_id)): Path<(String, String)>,
    payload: Result<Json<ProductRates>, JsonRejection>,
) -> ApiResult<ProductRateOverride> {
    let Json(rates) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if state.shops.get_shop(&shop_id).await?.is_none() {
        return Err(ApiError::not_found(
            "shop_not_found",
            format!("shop not found: {shop_id}"),
        ));
    }

    let rate_override = ProductRateOverride {
        shop_id,
        product_id,
        reviewer_rate: rates.reviewer_rate,
        buyer_rate: rates.buyer_rate,
        platform_fee_rate: rates.platform_fee_rate,
        active: rates.active,
    };
    validate_override(&rate_override)?;
    state.shops.set_product_override(&rate_override).await?;

    Ok(Json(rate_override))
}
