use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::{jwt::TokenError, otp::OtpError, repo_types::StoreError};

/// Every handler failure funnels through this type so the wire format
/// stays uniform: `{"error": "...", "status_code": N}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Phone number already registered")]
    DuplicatePhone,
    #[error("Emirates ID already registered")]
    DuplicateEmiratesId,
    #[error("Passport number already registered")]
    DuplicatePassport,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Account not verified. Please verify your email/phone")]
    AccountNotVerified,
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Service temporarily unavailable")]
    Unavailable,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateEmail
            | ApiError::DuplicatePhone
            | ApiError::DuplicateEmiratesId
            | ApiError::DuplicatePassport => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidCredentials
            | ApiError::AccountInactive
            | ApiError::AccountNotVerified
            | ApiError::Unauthorized(_)
            | ApiError::Token(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Otp(OtpError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Otp(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => ApiError::DuplicateEmail,
            StoreError::DuplicatePhone => ApiError::DuplicatePhone,
            StoreError::DuplicateEmiratesId => ApiError::DuplicateEmiratesId,
            StoreError::DuplicatePassport => ApiError::DuplicatePassport,
            StoreError::Unavailable(e) => {
                warn!(error = %e, "database unavailable");
                ApiError::Unavailable
            }
            StoreError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details never leave the process; the log keeps them.
        let message = match &self {
            ApiError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": message,
            "status_code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
