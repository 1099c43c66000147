use crate::services::{StoreError, VerificationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid payment claim: {0}")]
    InvalidClaim(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Missing or invalid X-User-Id header")]
    Unauthorized,

    #[error("Payment not found")]
    NotFound,

    #[error("Transaction signature was already used by another account")]
    SignatureAlreadyUsed,

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Verification already in progress, retry shortly")]
    VerificationInProgress,

    #[error("Server busy, retry shortly")]
    Overloaded,

    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidClaim(_) => "INVALID_CLAIM_FORMAT",
            ApiError::InvalidQuery(_) => "INVALID_QUERY",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::SignatureAlreadyUsed => "SIGNATURE_ALREADY_USED",
            ApiError::LedgerUnavailable(_) => "NETWORK_ERROR",
            ApiError::VerificationInProgress => "VERIFICATION_IN_PROGRESS",
            ApiError::Overloaded => "OVERLOADED",
            ApiError::StoreError(_) => "STORE_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidClaim(_) | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::SignatureAlreadyUsed => StatusCode::CONFLICT,
            ApiError::LedgerUnavailable(_)
            | ApiError::VerificationInProgress
            | ApiError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StoreError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ApiError::LedgerUnavailable(_)
                | ApiError::VerificationInProgress
                | ApiError::Overloaded
        )
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::InvalidClaimFormat(e) => ApiError::InvalidClaim(e.to_string()),
            VerificationError::Network(message) => ApiError::LedgerUnavailable(message),
            VerificationError::InProgress(_) => ApiError::VerificationInProgress,
            VerificationError::Overloaded => ApiError::Overloaded,
            VerificationError::Store(e) => ApiError::StoreError(e),
            VerificationError::Internal(message) => ApiError::InternalError(message),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub retryable: bool,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.error_code();

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            retryable: self.retryable(),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code, "Request failed");
        } else {
            tracing::debug!(error = %self, error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClaimError, Signature, SIGNATURE_LEN};

    #[test]
    fn test_verification_errors_map_to_statuses() {
        let cases = [
            (
                ApiError::from(VerificationError::InvalidClaimFormat(ClaimError::Plan(
                    "gold".to_string(),
                ))),
                StatusCode::BAD_REQUEST,
                false,
            ),
            (
                ApiError::from(VerificationError::Network("HTTP 503".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                ApiError::from(VerificationError::InProgress(Signature::new(
                    [1; SIGNATURE_LEN],
                ))),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                ApiError::from(VerificationError::Overloaded),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                ApiError::from(VerificationError::Store(StoreError::Backend(
                    "down".to_string(),
                ))),
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
            ),
        ];

        for (err, status, retryable) in cases {
            assert_eq!(err.status(), status, "{}", err);
            assert_eq!(err.retryable(), retryable, "{}", err);
        }
    }

    #[test]
    fn test_conflict_code() {
        let err = ApiError::SignatureAlreadyUsed;
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), "SIGNATURE_ALREADY_USED");
    }
}
