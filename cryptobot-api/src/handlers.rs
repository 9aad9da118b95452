use crate::error::ApiError;
use crate::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use cryptobot_core::models::{
    BotSettings, BotSettingsInput, BotSettingsPatch, NewTransaction, NewWallet, Stats,
    Transaction, TransactionPatch, Wallet, WalletPatch, WebhookConfig, WebhookConfigInput,
    WebhookConfigPatch,
};
use cryptobot_core::service::{TransactionPage, TransactionQuery};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str, what: &str) -> ApiResult<i32> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what} ID")))
}

fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Stats>> {
    Ok(Json(state.dashboard.stats().await?))
}

// Wallets

pub async fn list_wallets(State(state): State<AppState>) -> ApiResult<Json<Vec<Wallet>>> {
    Ok(Json(state.dashboard.list_wallets().await?))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Wallet>> {
    let id = parse_id(&id, "wallet")?;
    Ok(Json(state.dashboard.wallet(id).await?))
}

pub async fn create_wallet(
    State(state): State<AppState>,
    payload: Result<Json<NewWallet>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Wallet>)> {
    let Json(input) = payload?;
    let wallet = state.dashboard.create_wallet(input).await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

pub async fn update_wallet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<WalletPatch>, JsonRejection>,
) -> ApiResult<Json<Wallet>> {
    let id = parse_id(&id, "wallet")?;
    let Json(patch) = payload?;
    Ok(Json(state.dashboard.update_wallet(id, patch).await?))
}

pub async fn delete_wallet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let id = parse_id(&id, "wallet")?;
    let success = state.dashboard.delete_wallet(id).await?;
    Ok(Json(json!({ "success": success })))
}

// Transactions

#[derive(Debug, Deserialize)]
pub struct TransactionsParams {
    limit: Option<i64>,
    offset: Option<i64>,
    currency: Option<String>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    params: Result<Query<TransactionsParams>, QueryRejection>,
) -> ApiResult<Json<TransactionPage>> {
    let Query(q) = params?;
    let page = state
        .dashboard
        .list_transactions(TransactionQuery {
            limit: q.limit,
            offset: q.offset,
            currency: q.currency,
        })
        .await?;
    Ok(Json(page))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Transaction>> {
    let id = parse_id(&id, "transaction")?;
    Ok(Json(state.dashboard.transaction(id).await?))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<NewTransaction>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let Json(input) = payload?;
    let tx = state.dashboard.create_transaction(input).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TransactionPatch>, JsonRejection>,
) -> ApiResult<Json<Transaction>> {
    let id = parse_id(&id, "transaction")?;
    let Json(patch) = payload?;
    Ok(Json(state.dashboard.update_transaction(id, patch).await?))
}

// Webhook configuration

pub async fn get_webhook_config(
    State(state): State<AppState>,
) -> ApiResult<Json<WebhookConfig>> {
    Ok(Json(state.dashboard.webhook_config().await?))
}

pub async fn save_webhook_config(
    State(state): State<AppState>,
    payload: Result<Json<WebhookConfigInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WebhookConfig>)> {
    let Json(input) = payload?;
    let (config, created) = state.dashboard.save_webhook_config(input).await?;
    Ok((created_or_ok(created), Json(config)))
}

pub async fn patch_webhook_config(
    State(state): State<AppState>,
    payload: Result<Json<WebhookConfigPatch>, JsonRejection>,
) -> ApiResult<Json<WebhookConfig>> {
    let Json(patch) = payload?;
    Ok(Json(state.dashboard.patch_webhook_config(patch).await?))
}

// Bot settings

pub async fn get_bot_settings(State(state): State<AppState>) -> ApiResult<Json<BotSettings>> {
    Ok(Json(state.dashboard.bot_settings().await?))
}

pub async fn save_bot_settings(
    State(state): State<AppState>,
    payload: Result<Json<BotSettingsInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BotSettings>)> {
    let Json(input) = payload?;
    let (settings, created) = state.dashboard.save_bot_settings(input).await?;
    Ok((created_or_ok(created), Json(settings)))
}

pub async fn patch_bot_settings(
    State(state): State<AppState>,
    payload: Result<Json<BotSettingsPatch>, JsonRejection>,
) -> ApiResult<Json<BotSettings>> {
    let Json(patch) = payload?;
    Ok(Json(state.dashboard.patch_bot_settings(patch).await?))
}
