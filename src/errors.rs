use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Error body returned by every failing JSON endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable error kind for client-side dispatch
    pub kind: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("No purchasable items remain in the cart")]
    NoValidItems,

    #[error("Promotion cannot be applied: {0}")]
    PromotionInvalid(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("A payment attempt with this reference is already in progress")]
    DuplicateReference,

    #[error("Payment callback signature mismatch")]
    SignatureMismatch,

    #[error("Payment reference is unknown, already confirmed, or expired")]
    ExpiredOrUnknownReference,

    #[error("Pending payment record is corrupt: {0}")]
    CorruptPendingState(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::CorruptPendingState(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) | Self::ExpiredOrUnknownReference => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidInput(_)
            | Self::EmptyCart
            | Self::NoValidItems
            | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::PromotionInvalid(_) | Self::InsufficientStock(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::DuplicateReference => StatusCode::CONFLICT,
            Self::SignatureMismatch => StatusCode::UNAUTHORIZED,
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
        }
    }

    /// Stable snake_case kind for client-side dispatch.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "commit_failure",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::EmptyCart => "empty_cart",
            Self::NoValidItems => "no_valid_items",
            Self::PromotionInvalid(_) => "promotion_invalid",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::DuplicateReference => "duplicate_reference",
            Self::SignatureMismatch => "signature_mismatch",
            Self::ExpiredOrUnknownReference => "expired_or_unknown_reference",
            Self::CorruptPendingState(_) => "corrupt_pending_state",
            Self::PaymentFailed(_) => "payment_failed",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::CorruptPendingState(_) => "Payment state could not be restored".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: self.response_message(),
            kind: self.kind().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
