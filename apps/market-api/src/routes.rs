//! # HTTP Routes
//!
//! ```text
//! /api/v1
//!   GET  /status                                   {"status": "ok"}
//!   GET  /items?appId=&currency=&skip=&limit=&sortBy=&order=
//!   GET  /user?userId=
//!   POST /user/register                            201 + user
//!   POST /user/deposit?userId=&value=              user
//!   POST /user/buy?userId=&value=                  user
//! ```
//!
//! Query parameters arrive as strings and are validated here, so a bad value
//! produces the usual `{"error": ...}` body instead of a plain-text
//! rejection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use market_core::items::{parse_app_ids, ItemsQuery};
use market_core::types::{MarketItem, User};
use market_core::validation::{parse_amount, validate_user_id};
use market_core::{SortDirection, ValidationError};
use market_db::ClientProvider;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const API_PREFIX: &str = "/api/v1";

/// Builds the `/api/v1` router.
pub fn router<P>(state: Arc<AppState<P>>) -> Router
where
    P: ClientProvider + 'static,
{
    let api = Router::new()
        .route("/status", get(status))
        .route("/items", get(get_items::<P>))
        .route("/user", get(get_user::<P>))
        .route("/user/register", post(register::<P>))
        .route("/user/deposit", post(deposit::<P>))
        .route("/user/buy", post(buy::<P>));

    Router::new().nest(API_PREFIX, api).with_state(state)
}

/// Wraps the router in request tracing and a per-request timeout.
///
/// A request that runs past `request_timeout` is dropped and answered with
/// 408. Database transactions it had open are discarded by the client.
pub fn with_middleware(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// Parameters
// =============================================================================

/// Raw `GET /items` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsParams {
    pub app_id: Option<String>,
    pub currency: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

impl ItemsParams {
    /// Applies defaults and validates every parameter.
    pub fn into_query(self) -> Result<ItemsQuery, ValidationError> {
        let defaults = ItemsQuery::default();

        let app_ids = match non_empty(self.app_id) {
            Some(raw) => parse_app_ids(&raw)?,
            None => defaults.app_ids,
        };
        let currency = match non_empty(self.currency) {
            Some(raw) => raw.parse()?,
            None => defaults.currency,
        };
        let sort_by = match non_empty(self.sort_by) {
            Some(raw) => raw.parse()?,
            None => defaults.sort_by,
        };
        let order = match non_empty(self.order) {
            Some(raw) => raw
                .parse::<SortDirection>()
                .map_err(|_| ValidationError::NotAllowed {
                    field: "order".to_string(),
                    allowed: vec!["asc".to_string(), "desc".to_string()],
                })?,
            None => defaults.order,
        };

        Ok(ItemsQuery {
            app_ids,
            currency,
            skip: parse_count("skip", self.skip)?.unwrap_or(defaults.skip),
            limit: parse_count("limit", self.limit)?.unwrap_or(defaults.limit),
            sort_by,
            order,
        })
    }
}

/// `?userId=`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    pub user_id: Option<String>,
}

impl UserParams {
    pub fn user_id(&self) -> Result<Uuid, ValidationError> {
        validate_user_id(self.user_id.as_deref().unwrap_or_default())
    }
}

/// `?userId=&value=`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountParams {
    pub user_id: Option<String>,
    pub value: Option<String>,
}

impl AmountParams {
    pub fn parse(&self) -> Result<(Uuid, Decimal), ValidationError> {
        let id = validate_user_id(self.user_id.as_deref().unwrap_or_default())?;
        let value = parse_amount(self.value.as_deref().unwrap_or_default())?;
        Ok((id, value))
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
}

fn parse_count(field: &str, raw: Option<String>) -> Result<Option<usize>, ValidationError> {
    non_empty(raw)
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .map_err(|_| ValidationError::InvalidFormat {
                    field: field.to_string(),
                    reason: "must be a non-negative integer".to_string(),
                })
        })
        .transpose()
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn get_items<P: ClientProvider>(
    State(state): State<Arc<AppState<P>>>,
    Query(params): Query<ItemsParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.into_query()?;
    let items: Vec<MarketItem> = state.items.get_items(&query).await?;

    let cache_control = format!("public, max-age={}", state.request_cache_ttl.as_secs());
    Ok(([(header::CACHE_CONTROL, cache_control)], Json(items)))
}

async fn get_user<P: ClientProvider>(
    State(state): State<Arc<AppState<P>>>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<User>> {
    let id = params.user_id()?;
    state
        .users
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(ApiError::user_not_found)
}

async fn register<P: ClientProvider>(
    State(state): State<Arc<AppState<P>>>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.users.add_user().await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn deposit<P: ClientProvider>(
    State(state): State<Arc<AppState<P>>>,
    Query(params): Query<AmountParams>,
) -> ApiResult<Json<User>> {
    let (id, value) = params.parse()?;
    if state.users.get_user(id).await?.is_none() {
        return Err(ApiError::user_not_found());
    }

    state
        .users
        .deposit(id, value)
        .await?
        .map(Json)
        .ok_or_else(ApiError::user_not_found)
}

async fn buy<P: ClientProvider>(
    State(state): State<Arc<AppState<P>>>,
    Query(params): Query<AmountParams>,
) -> ApiResult<Json<User>> {
    let (id, value) = params.parse()?;
    if state.users.get_user(id).await?.is_none() {
        return Err(ApiError::user_not_found());
    }

    state
        .users
        .buy(id, value)
        .await?
        .map(Json)
        .ok_or_else(ApiError::user_not_found)
}

// =============================================================================
// Unit Tests
// =============================================================================
