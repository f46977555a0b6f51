//! Service-wide error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Sorry, We have ran out of this type")]
    StockExceeded,

    #[error("{0}")]
    Validation(String),

    #[error("Order amount is below the voucher minimum")]
    BelowMinimumAmount,

    #[error("{0}")]
    Conflict(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StockExceeded | Self::Validation(_) | Self::BelowMinimumAmount => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        // End users get a generic message for internal failures; the cause is
        // logged here, not leaked in the payload.
        let message = match &self {
            Self::Database(err) => {
                tracing::error!(error = %err, "request failed on a database error");
                "Something went wrong, please try again.".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(serde_json::json!({ "success": false, "message": message }));
        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// Postgres unique-violation check, used to turn duplicate usernames/emails
/// (and racing voucher redemptions) into a client error instead of a 500.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Postgres foreign-key violation, used to turn writes that reference a
/// missing user into `NotFound`.
pub(crate) fn is_fk_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23503"))
}
