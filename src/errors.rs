use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned to HTTP callers.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    #[schema(example = "Conflict")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "Order is not awaiting vendor acceptance")]
    pub message: String,
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

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Payment gateway rejected the request; carries the provider's
    /// customer-facing message verbatim.
    #[error("Payment gateway error: {0}")]
    PaymentGatewayError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    fn status_and_label(&self) -> (StatusCode, &'static str) {
        match self {
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            ServiceError::ValidationError(_) | ServiceError::InvalidOperation(_) => {
                (StatusCode::BAD_REQUEST, "Bad Request")
            }
            ServiceError::AuthError(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            ServiceError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            ServiceError::PaymentGatewayError(_) => (StatusCode::BAD_GATEWAY, "Bad Gateway"),
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    /// Message safe to hand to external callers. Infrastructure failures are
    /// logged with full context at the call site and collapsed here.
    fn public_message(&self) -> String {
        match self {
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, label) = self.status_and_label();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed with internal error");
        }

        let body = ErrorResponse {
            error: label.to_string(),
            message: self.public_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let (status, label) = ServiceError::Conflict("taken".into()).status_and_label();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(label, "Conflict");
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ServiceError::InternalError("connection pool exhausted at 10.0.0.3".into());
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn gateway_message_passes_through_verbatim() {
        let err = ServiceError::PaymentGatewayError(
            "The balance is insufficient for the transaction".into(),
        );
        assert!(err.public_message().contains("insufficient"));
    }
}
