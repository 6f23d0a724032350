//! The authenticated ingestion endpoint.
//!
//! `POST /ingest/{source_key}` runs a strictly ordered pipeline and fails
//! fast at the first rejected step: header presence, credential
//! verification, rate limiting, JSON parsing, schema validation,
//! normalization, persistence. Every auth failure mode yields the same
//! 401 body.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use irm_engine::{normalize, validate_payload, RateLimitDecision};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/ingest/:source_key", post(ingest_event))
}

async fn ingest_event(
    State(state): State<AppState>,
    Path(source_key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // 1. Header presence
    let Some(api_key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Missing API key"})),
        )
            .into_response();
    };

    // 2. Credential verification. Unknown key, wrong secret, and disabled
    //    source all collapse into the same response.
    let source = match state.registry.verify(&source_key, api_key).await {
        Ok(Some(source)) => source,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid API key"})),
            )
                .into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    // 3. Rate limit
    let decision = state
        .limiter
        .check(&source.key, source.rate_limit.max(1) as u32);
    if !decision.allowed {
        let retry_after = decision.retry_after_seconds(Utc::now());
        warn!(source_key = %source.key, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            rate_limit_headers(&decision, Some(retry_after)),
            Json(json!({
                "error": "Rate limit exceeded",
                "retryAfter": retry_after
            })),
        )
            .into_response();
    }

    // 4. JSON parse
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid JSON payload"})),
            )
                .into_response();
        }
    };

    // 5. Schema validation
    if let Err(problems) = validate_payload(&raw) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Validation failed",
                "details": problems
            })),
        )
            .into_response();
    }

    // 6. Normalization
    let event = match normalize(&raw, &source, Utc::now()) {
        Ok(event) => event,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Normalization failed",
                    "details": e.fields
                })),
            )
                .into_response();
        }
    };

    // 7. Persist event and actor atomically
    match state.store.record_event(&event).await {
        Ok(event_id) => {
            info!(
                source_key = %source.key,
                actor_id = %event.actor_id,
                event_id = %event_id,
                "Event ingested"
            );
            (
                StatusCode::ACCEPTED,
                rate_limit_headers(&decision, None),
                Json(json!({"eventId": event_id})),
            )
                .into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn rate_limit_headers(
    decision: &RateLimitDecision,
    retry_after: Option<i64>,
) -> HeaderMap {
    let mut map = HeaderMap::new();

    if let Ok(value) = decision.remaining.to_string().parse() {
        map.insert(RATELIMIT_REMAINING.clone(), value);
    }
    if let Ok(value) = decision.reset_at.to_rfc3339().parse() {
        map.insert(RATELIMIT_RESET.clone(), value);
    }
    if let Some(seconds) = retry_after {
        if let Ok(value) = seconds.to_string().parse() {
            map.insert(header::RETRY_AFTER, value);
        }
    }

    map
}
