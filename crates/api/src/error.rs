use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use irm_core::Error;
use serde_json::json;
use tracing::{debug, error, warn};

/// Axum wrapper around the core error type. Responses never leak internal
/// details: server-side failures collapse to a generic message, and every
/// 401 is indistinguishable from every other 401.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = %self.0.code, error = %self.0, "Request failed");
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(code = %self.0.code, "Request rejected");
        } else {
            debug!(code = %self.0.code, error = %self.0, "Client error");
        }

        let body = if status.is_server_error() {
            json!({"error": "Internal server error"})
        } else if status == StatusCode::UNAUTHORIZED {
            json!({"error": "Invalid API key"})
        } else if self.0.fields.is_empty() {
            json!({"error": self.0.message})
        } else {
            json!({"error": self.0.message, "details": self.0.fields})
        };

        (status, Json(body)).into_response()
    }
}
