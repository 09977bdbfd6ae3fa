use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// Infrastructure failure. Expected authentication/authorization outcomes
/// are [`Rejection`] values, never variants here: only conditions like an
/// unreachable persistence layer propagate as errors, and the dispatch
/// gate treats any of them as a deny (fail closed).
#[derive(ThisError, Debug)]
pub enum Error {
    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Database(DbError::UniqueViolation { .. }) => "Resource already exists".to_string(),
            Error::Database(DbError::NotFound) => "Resource not found".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging; the response body stays generic.
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Expected failure of an authentication or authorization operation.
///
/// Returned as a plain value so every call site must branch on both
/// outcomes. The externally visible message is uniform for the first two
/// variants: a wrong secret, an unknown identifier and a restricted
/// account must be indistinguishable to the caller. The distinction
/// exists only for internal audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Wrong secret or unknown identifier.
    InvalidCredentials,
    /// Banned or inactive account. Surfaced externally as a generic
    /// failure, logged internally with the real reason.
    AccountRestricted,
    /// Token past its expiry.
    TokenExpired,
    /// Single-use token replayed after consumption, or a rotated-out
    /// remember token presented again.
    TokenAlreadyConsumed,
    /// Authorization deny.
    Unauthorized,
    /// CSRF token absent or not matching the session-bound value.
    CsrfMismatch,
    /// Too many attempts inside the throttle window.
    RateLimited,
    /// New secret fails the configured password rules.
    PasswordPolicy,
}

impl Rejection {
    /// Non-enumerating message safe to show to the end user.
    pub fn user_message(self) -> &'static str {
        match self {
            Rejection::InvalidCredentials | Rejection::AccountRestricted => "Invalid email or password",
            Rejection::TokenExpired | Rejection::TokenAlreadyConsumed => "Invalid or expired token",
            Rejection::Unauthorized => "Access denied",
            Rejection::CsrfMismatch => "Request could not be validated",
            Rejection::RateLimited => "Too many attempts, please retry later",
            Rejection::PasswordPolicy => "Password does not meet the requirements",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a fallible-by-design auth operation: infrastructure errors
/// in the outer layer, expected rejections in the inner one.
pub type Outcome<T> = Result<std::result::Result<T, Rejection>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_credential_messages() {
        // Unknown identifier and restricted account must read identically.
        assert_eq!(
            Rejection::InvalidCredentials.user_message(),
            Rejection::AccountRestricted.user_message()
        );
    }

    #[test]
    fn test_infrastructure_errors_are_internal() {
        let err = Error::Internal {
            operation: "hash password".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Internal server error");
    }
}
