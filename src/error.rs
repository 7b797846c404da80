use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::banks::BankError;
use crate::ports::RepositoryError;
use crate::services::webhook::WebhookError;
use crate::session::SessionError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Sender account does not belong to the caller")]
    SenderAccountMismatch,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not enough fund: balance {balance}, required {required}")]
    NotEnoughFund { balance: String, required: String },

    #[error("A challenge is required for this transaction")]
    ChallengeNotPassed,

    #[error("Verification failed: {0}")]
    FailedVerification(String),

    #[error("Two factor check failed")]
    FailedToCheckTwoFactor,

    #[error("No response from partner: {0}")]
    NoResponse(String),

    #[error("Failed to verify transaction: {0}")]
    FailedToVerifyTransaction(String),

    #[error("Failed to add account: {0}")]
    FailedToAddAccount(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code returned to clients.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::SenderAccountMismatch => "SENDER_ACCOUNT_MISMATCH",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NotEnoughFund { .. } => "NOT_ENOUGH_FUND",
            AppError::ChallengeNotPassed => "Challenge_NOT_PASTED",
            AppError::FailedVerification(_) => "FAILED_VERIFICATION",
            AppError::FailedToCheckTwoFactor => "FAILED_TO_CHEKE_2FA",
            AppError::NoResponse(_) => "NO_RESPONSE",
            AppError::FailedToVerifyTransaction(_) => "FAILED_TO_VERIFY_TRANSACTION",
            AppError::FailedToAddAccount(_) => "FAILED_TO_ADD_ACCOUNT",
            AppError::Persistence(_) | AppError::Internal(_) => "INTERNAL",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "type": self.error_type(),
            "message": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(msg) => AppError::InvalidRequest(msg),
            RepositoryError::Backend(msg) => AppError::Persistence(msg),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidRequest(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Encode(msg) => AppError::Internal(msg),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<BankError> for AppError {
    fn from(err: BankError) -> Self {
        match err {
            BankError::Transport(_) | BankError::CircuitOpen(_) | BankError::Timeout => {
                AppError::NoResponse(err.to_string())
            }
            BankError::Rejected(msg) => AppError::FailedToVerifyTransaction(msg),
            BankError::InvalidResponse(msg) => AppError::NoResponse(msg),
            BankError::MissingCredential(name) => {
                AppError::Internal(format!("missing partner credential {}", name))
            }
            BankError::Unsupported(swift) => {
                AppError::InvalidRequest(format!("bank {} is not supported", swift))
            }
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Encode(msg) | WebhookError::Signing(msg) => AppError::Internal(msg),
            other => AppError::NoResponse(other.to_string()),
        }
    }
}
