//! Error taxonomy shared by the stores and the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("payment capture failed: {0}")]
    PaymentFailure(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl ShopError {
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// True when the underlying database error is a unique-constraint hit.
    /// Uniqueness races on (owner, status) and (cart, product) are resolved
    /// internally by the cart engine and never reach the boundary.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for ShopError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Invalid(e.to_string())
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::PaymentFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
