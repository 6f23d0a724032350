//! Structured error handling for the pipeline.
//!
//! A single [`Error`] type flows through every crate. Each error carries a
//! standardized [`ErrorCode`] (which maps to an HTTP status and a logging
//! category) plus an optional list of per-field messages for validation
//! failures, so ingestion responses can report exactly which fields were
//! rejected.

pub mod codes;

pub use codes::ErrorCode;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// A single field-level problem inside a validation or normalization error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

/// Main error type for the insider-risk pipeline.
#[derive(Debug, ThisError, Clone, Serialize)]
pub struct Error {
    /// Standardized error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional detailed description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Per-field messages for validation-class errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            fields: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_field(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.fields.push(FieldError::new(path, message));
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldError>) -> Self {
        self.fields = fields;
        self
    }

    /// HTTP status this error surfaces as.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn should_log_as_error(&self) -> bool {
        self.code.should_log_as_error()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, ": {}", details)?;
        }
        for field in &self.fields {
            match &field.path {
                Some(path) => write!(f, "; {}: {}", path, field.message)?,
                None => write!(f, "; {}", field.message)?,
            }
        }
        Ok(())
    }
}

// Convenience constructors for common errors
impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn normalization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NormalizationFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationFailed, message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidCredentials, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateKey, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimitExceeded, message)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                    ErrorCode::DatabaseConstraintViolation
                } else {
                    ErrorCode::DatabaseQueryError
                }
            }
            sqlx::Error::PoolTimedOut => ErrorCode::DatabaseConnectionError,
            sqlx::Error::Io(_) => ErrorCode::DatabaseConnectionError,
            sqlx::Error::RowNotFound => ErrorCode::ResourceNotFound,
            _ => ErrorCode::DatabaseQueryError,
        };

        Self::new(code, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        let code = if err.is_syntax() || err.is_eof() {
            ErrorCode::InvalidJsonPayload
        } else {
            ErrorCode::SerializationError
        };

        Self::new(code, err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::new(ErrorCode::ConfigurationError, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(Error::validation("bad").http_status(), 400);
        assert_eq!(Error::unauthorized("no").http_status(), 401);
        assert_eq!(Error::not_found("gone").http_status(), 404);
        assert_eq!(Error::conflict("dup").http_status(), 409);
        assert_eq!(Error::rate_limited("slow down").http_status(), 429);
        assert_eq!(Error::internal("boom").http_status(), 500);
    }

    #[test]
    fn field_errors_render_in_display() {
        let err = Error::validation("Validation failed")
            .with_field("actorId", "missing required field")
            .with_field("bytes", "must be non-negative");
        let rendered = err.to_string();
        assert!(rendered.contains("actorId"));
        assert!(rendered.contains("bytes"));
    }

    #[test]
    fn retryable_codes() {
        assert!(Error::new(ErrorCode::DatabaseConnectionError, "down").is_retryable());
        assert!(!Error::validation("bad").is_retryable());
    }
}
