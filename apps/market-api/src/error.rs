//! Error types for Market API.
//!
//! Every handler returns `Result<_, ApiError>`; the error renders as
//! `{"error": "<message>"}` with a matching status code.
//!
//! ```text
//! NotFound           → 404
//! Validation         → 400
//! Conflict           → 409   (aborted purchase, serialization failure)
//! Upstream           → 502   (pricing API)
//! Database/Internal  → 500   (details logged, generic message returned)
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use market_core::ValidationError;
use market_db::DbError;
use serde_json::json;
use tracing::error;

use crate::services::PriceSourceError;

/// Market API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Conflict(String),

    #[error("Pricing API request failed: {0}")]
    Upstream(#[from] PriceSourceError),

    #[error("Database error: {0}")]
    Database(DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn user_not_found() -> Self {
        ApiError::NotFound("User not found!".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Aborted(reason) => ApiError::Conflict(reason),
            err if err.is_serialization_failure() => ApiError::Conflict(
                "Concurrent update detected, please retry".to_string(),
            ),
            err => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Database(err) => {
                error!(
                    error = %err,
                    code = ?err.code(),
                    detail = ?err.detail(),
                    "Database error"
                );
                "Internal server error".to_string()
            }
            ApiError::Internal(message) => {
                error!(error = %message, "Internal error");
                "Internal server error".to_string()
            }
            ApiError::Upstream(err) => {
                error!(error = %err, "Pricing API error");
                self.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
