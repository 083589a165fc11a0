use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error structure returned to HTTP clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Gateway")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Gateway lookup failed: {0}")]
    GatewayLookupFailed(String),

    #[error("Payment verification failed (upstream status {status:?}): {detail}")]
    VerificationFailed { status: Option<u16>, detail: String },

    #[error("Invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("Settlement already applied for order {0}")]
    SettlementConflict(i64),

    #[error("Concurrent modification of order {0}")]
    ConcurrentModification(i64),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Builds a `VerificationFailed` carrying the upstream HTTP status and
    /// response body for diagnostics.
    pub fn verification_failed(status: Option<u16>, detail: impl Into<String>) -> Self {
        ServiceError::VerificationFailed {
            status,
            detail: detail.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::SerializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidIdentifier(_) | Self::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::SettlementConflict(_) | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::GatewayLookupFailed(_)
            | Self::VerificationFailed { .. }
            | Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidIdentifier("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::GatewayLookupFailed("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::verification_failed(Some(504), "timeout").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::SettlementConflict(7).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ConcurrentModification(7).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn response_message_hides_database_details() {
        let err = ServiceError::DatabaseError(sea_orm::DbErr::Custom(
            "connection refused at 10.0.0.3".into(),
        ));
        assert_eq!(err.response_message(), "Database error");

        // User-facing errors keep their message
        assert_eq!(
            ServiceError::NotFound("Order 9 not found".into()).response_message(),
            "Not found: Order 9 not found"
        );
    }

    #[test]
    fn verification_failed_carries_upstream_detail() {
        let err = ServiceError::verification_failed(Some(404), "payment not registered");
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("payment not registered"));
    }
}
