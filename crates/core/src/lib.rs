pub mod config;
pub mod error;
pub mod security;
pub mod types;

pub use config::{AlertingConfig, Config, DatabaseConfig, RetentionConfig, SchedulerConfig, ScoringConfig, SecurityConfig, ServerConfig};
pub use error::{Error, ErrorCode, FieldError, Result};
pub use security::{generate_api_key, ApiKeyHasher, API_KEY_PREFIX};
pub use types::*;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
