use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::gate::Rejection;
use crate::utils::response::{envelope, failure};

/// Business-rule conflicts on the one-record-per-day state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateConflict {
    #[error("Already checked in today")]
    AlreadyCheckedIn,
    #[error("Already checked out today")]
    AlreadyCheckedOut,
    #[error("No check in record found for today")]
    NoCheckInFound,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unreadable row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Maps SQLSTATE 23000 unique violations to [`StoreError::Duplicate`].
    pub fn from_insert(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Database(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<String>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("User not found or inactive")]
    NotFoundOrInactive,
    #[error("{}", .0.reason)]
    GateRejected(Rejection),
    #[error("{0}")]
    Conflict(#[from] StateConflict),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("Service temporarily unavailable")]
    Persistence(#[from] StoreError),
    #[error("Internal server error")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Persistence(StoreError::Database(e))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::NotFoundOrInactive => StatusCode::UNAUTHORIZED,
            AppError::GateRejected(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Validation(errors) => envelope(
                self.status_code(),
                false,
                self.to_string(),
                Some(json!({ "errors": errors })),
            ),
            AppError::Persistence(e) => {
                error!(error = %e, "Persistence failure");
                failure(self.status_code(), self.to_string())
            }
            AppError::Internal(detail) => {
                error!(detail = %detail, "Internal error");
                failure(self.status_code(), self.to_string())
            }
            _ => failure(self.status_code(), self.to_string()),
        }
    }
}
