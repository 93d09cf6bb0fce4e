//! Mapping of component errors onto HTTP responses.
//!
//! Invalid input is 400, missing entities 404, withdrawal rule violations
//! 422 and unavailable dependencies 503. The body always carries a stable
//! `error` code next to the human-readable message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::ledger::LedgerError;
use crate::rates::RateError;
use crate::reconciler::ReconcileError;
use crate::referral::RegistryError;
use crate::storage::StoreError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, code = self.code, message = %self.message, "request failed");
        }
        (
            self.status,
            Json(json!({ "error": self.code, "message": self.message })),
        )
            .into_response()
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Invalid(msg) => ApiError::bad_request(msg),
            ReconcileError::Unavailable(msg) => ApiError::unavailable(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::unavailable(err.to_string())
    }
}

impl From<RateError> for ApiError {
    fn from(err: RateError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ReferralCodeNotFound(_) => {
                ApiError::not_found("referral_code_not_found", err.to_string())
            }
            RegistryError::MemberOnly => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "member_only", err.to_string())
            }
            other => ApiError::unavailable(other.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let unprocessable = |code| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, code, err.to_string());
        match &err {
            LedgerError::InvalidAmount(_) => unprocessable("invalid_amount"),
            LedgerError::InsufficientBalance { .. } => unprocessable("insufficient_balance"),
            LedgerError::BelowMinimum { .. } => unprocessable("below_minimum"),
            LedgerError::WithdrawalNotPending(_) => unprocessable("withdrawal_not_pending"),
            LedgerError::AccountNotFound(_) => ApiError::not_found("account_not_found", err.to_string()),
            LedgerError::WithdrawalNotFound(_) => {
                ApiError::not_found("withdrawal_not_found", err.to_string())
            }
            LedgerError::ExpiryOutOfRange(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
            }
            LedgerError::Store(_) => ApiError::unavailable(err.to_string()),
        }
    }
}
