use serde::{Deserialize, Serialize};
use std::fmt;

/// Standardized error codes for the insider-risk pipeline.
/// These are business-agnostic and represent technical error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // General system errors
    InternalServerError,
    ConfigurationError,
    ServiceUnavailable,

    // Database errors
    DatabaseConnectionError,
    DatabaseConstraintViolation,
    DatabaseTransactionError,
    DatabaseQueryError,
    DatabaseMigrationError,

    // Serialization errors
    SerializationError,
    InvalidJsonPayload,

    // Security & authentication errors
    AuthenticationFailed,
    InvalidCredentials,

    // Input validation errors
    ValidationFailed,
    MissingRequiredField,
    InvalidFieldType,
    ValueOutOfRange,
    NormalizationFailed,

    // Resource errors
    ResourceNotFound,
    DuplicateKey,

    // Rate limiting
    RateLimitExceeded,

    // Background jobs
    JobExecutionFailed,
}

impl ErrorCode {
    /// HTTP status code this error surfaces as.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InternalServerError
            | ErrorCode::ConfigurationError
            | ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseTransactionError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::DatabaseMigrationError
            | ErrorCode::SerializationError
            | ErrorCode::JobExecutionFailed => 500,

            ErrorCode::ServiceUnavailable => 503,

            ErrorCode::AuthenticationFailed | ErrorCode::InvalidCredentials => 401,

            ErrorCode::ValidationFailed
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldType
            | ErrorCode::ValueOutOfRange
            | ErrorCode::NormalizationFailed
            | ErrorCode::InvalidJsonPayload => 400,

            ErrorCode::ResourceNotFound => 404,

            ErrorCode::DuplicateKey | ErrorCode::DatabaseConstraintViolation => 409,

            ErrorCode::RateLimitExceeded => 429,
        }
    }

    /// Category label used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::InternalServerError
            | ErrorCode::ConfigurationError
            | ErrorCode::ServiceUnavailable => "system",

            ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseConstraintViolation
            | ErrorCode::DatabaseTransactionError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::DatabaseMigrationError => "database",

            ErrorCode::SerializationError | ErrorCode::InvalidJsonPayload => "serialization",

            ErrorCode::AuthenticationFailed | ErrorCode::InvalidCredentials => "security",

            ErrorCode::ValidationFailed
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldType
            | ErrorCode::ValueOutOfRange
            | ErrorCode::NormalizationFailed => "validation",

            ErrorCode::ResourceNotFound | ErrorCode::DuplicateKey => "resource",

            ErrorCode::RateLimitExceeded => "rate_limit",

            ErrorCode::JobExecutionFailed => "jobs",
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::DatabaseConnectionError
                | ErrorCode::DatabaseTransactionError
                | ErrorCode::ServiceUnavailable
                | ErrorCode::RateLimitExceeded
        )
    }

    /// Whether this code warrants error-level logging by default.
    pub fn should_log_as_error(&self) -> bool {
        self.http_status() >= 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
