use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error};

use crate::model::TimesheetStatus;

pub type AppResult<T> = Result<T, AppError>;

/// Why the authorization gate turned a request away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    NoSession,
    InvalidCredentials,
    NoOrganization,
    Deactivated,
    AdminRequired,
    NotOwner,
    SelfModification,
    NotProjectMember,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Denial::NoSession => "Not authenticated",
            Denial::InvalidCredentials => "Invalid credentials",
            Denial::NoOrganization => "Profile is not assigned to an organization",
            Denial::Deactivated => "Profile is deactivated",
            Denial::AdminRequired => "Not authorized",
            Denial::NotOwner => "Only the owner may do this",
            Denial::SelfModification => "Admins cannot change their own role or status",
            Denial::NotProjectMember => "Not assigned to this project",
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(Denial),

    #[error("cannot {action} a timesheet that is {status}")]
    InvalidTransition {
        status: TimesheetStatus,
        action: &'static str,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence error: {0}")]
    Persistence(#[source] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(Denial::NoSession | Denial::InvalidCredentials) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client; storage details stay in the logs
    pub fn client_message(&self) -> String {
        match self {
            AppError::Unauthorized(denial) => denial.message().to_string(),
            AppError::Persistence(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
            AppError::Validation(message)
            | AppError::Conflict(message) => message.clone(),
            AppError::NotFound(what) => format!("{} not found", what),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                AppError::Conflict(format!("Duplicate value violates {}", constraint))
            }
            other => AppError::Persistence(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            debug!(error = %self, code = self.code(), "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.client_message(),
            code: self.code(),
        });

        (status, body).into_response()
    }
}
