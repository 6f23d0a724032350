//! Canonicalization of raw source payloads.
//!
//! Heterogeneous emitters name the same semantic slots differently, so each
//! canonical field is extracted through a fixed priority list of accepted
//! keys. Both passes are pure: [`validate_payload`] checks shape and types
//! (the endpoint's schema-validation step), [`normalize`] produces the
//! canonical event (the normalization step). Raw fields not consumed by a
//! canonical slot are preserved verbatim in the event metadata bag.

use chrono::{DateTime, TimeZone, Utc};
use irm_core::error::{Error, FieldError, Result};
use irm_core::{ActorType, EventOutcome};
use irm_store::{Event, Source};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Accepted source keys per canonical slot, in priority order.
const ACTOR_ID_KEYS: [&str; 4] = ["actorId", "actor", "userId", "user"];
const ACTOR_TYPE_KEYS: [&str; 1] = ["actorType"];
const OCCURRED_AT_KEYS: [&str; 2] = ["occurredAt", "timestamp"];
const ACTION_TYPE_KEYS: [&str; 3] = ["actionType", "action", "type"];
const RESOURCE_TYPE_KEYS: [&str; 1] = ["resourceType"];
const RESOURCE_ID_KEYS: [&str; 2] = ["resourceId", "resource"];
const IP_KEYS: [&str; 2] = ["ip", "ipAddress"];
const USER_AGENT_KEYS: [&str; 1] = ["userAgent"];
const BYTES_KEYS: [&str; 2] = ["bytes", "bytesTransferred"];
const OUTCOME_KEYS: [&str; 1] = ["outcome"];
const SUCCESS_FLAG_KEYS: [&str; 1] = ["success"];

/// Hex characters of the SHA-256 digest kept when redacting a resource id.
const REDACTED_DIGEST_LEN: usize = 16;

/// Check shape, required fields, and field types without producing an
/// event. Returns every problem found rather than stopping at the first.
pub fn validate_payload(raw: &Value) -> std::result::Result<(), Vec<FieldError>> {
    let mut problems = Vec::new();

    let Some(object) = raw.as_object() else {
        return Err(vec![FieldError::message_only("payload must be a JSON object")]);
    };

    match pick(object, &ACTOR_ID_KEYS) {
        None => problems.push(FieldError::new(
            "actorId",
            "missing required field (accepted: actorId, actor, userId, user)",
        )),
        Some((key, value)) => {
            if non_empty_string(value).is_none() {
                problems.push(FieldError::new(key, "must be a non-empty string"));
            }
        }
    }

    match pick(object, &ACTION_TYPE_KEYS) {
        None => problems.push(FieldError::new(
            "actionType",
            "missing required field (accepted: actionType, action, type)",
        )),
        Some((key, value)) => {
            if non_empty_string(value).is_none() {
                problems.push(FieldError::new(key, "must be a non-empty string"));
            }
        }
    }

    if let Some((key, value)) = pick(object, &ACTOR_TYPE_KEYS) {
        match value.as_str() {
            Some("employee") | Some("service") => {}
            _ => problems.push(FieldError::new(key, "must be 'employee' or 'service'")),
        }
    }

    if let Some((key, value)) = pick(object, &OCCURRED_AT_KEYS) {
        if parse_timestamp(value).is_none() {
            problems.push(FieldError::new(
                key,
                "must be an RFC 3339 timestamp or epoch milliseconds",
            ));
        }
    }

    if let Some((key, value)) = pick(object, &BYTES_KEYS) {
        match value.as_i64() {
            Some(n) if n >= 0 => {}
            _ => problems.push(FieldError::new(key, "must be a non-negative integer")),
        }
    }

    if let Some((key, value)) = pick(object, &OUTCOME_KEYS) {
        if parse_outcome_str(value).is_none() {
            problems.push(FieldError::new(
                key,
                "must be one of 'success', 'failure', 'failed', 'error'",
            ));
        }
    } else if let Some((key, value)) = pick(object, &SUCCESS_FLAG_KEYS) {
        if !value.is_boolean() {
            problems.push(FieldError::new(key, "must be a boolean"));
        }
    }

    for keys in [&RESOURCE_TYPE_KEYS[..], &RESOURCE_ID_KEYS[..], &IP_KEYS[..], &USER_AGENT_KEYS[..]] {
        if let Some((key, value)) = pick(object, keys) {
            if !value.is_string() {
                problems.push(FieldError::new(key, "must be a string"));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Produce the canonical event for a validated payload. The event id is
/// always generated here; source-supplied identifiers are never trusted.
pub fn normalize(raw: &Value, source: &Source, ingested_at: DateTime<Utc>) -> Result<Event> {
    let object = raw
        .as_object()
        .ok_or_else(|| Error::normalization("payload must be a JSON object"))?;

    let mut consumed: Vec<&str> = Vec::new();

    let (actor_key, actor_value) = pick(object, &ACTOR_ID_KEYS).ok_or_else(|| {
        Error::normalization("Normalization failed").with_field("actorId", "missing required field")
    })?;
    let actor_id = non_empty_string(actor_value)
        .ok_or_else(|| {
            Error::normalization("Normalization failed")
                .with_field(actor_key, "must be a non-empty string")
        })?
        .to_string();
    consumed.push(actor_key);

    let (action_key, action_value) = pick(object, &ACTION_TYPE_KEYS).ok_or_else(|| {
        Error::normalization("Normalization failed")
            .with_field("actionType", "missing required field")
    })?;
    let action_type = non_empty_string(action_value)
        .ok_or_else(|| {
            Error::normalization("Normalization failed")
                .with_field(action_key, "must be a non-empty string")
        })?
        .to_string();
    consumed.push(action_key);

    let actor_type = match pick(object, &ACTOR_TYPE_KEYS) {
        Some((key, value)) => {
            consumed.push(key);
            match value.as_str() {
                Some(s) => s.parse::<ActorType>().map_err(|_| {
                    Error::normalization("Normalization failed")
                        .with_field(key, "must be 'employee' or 'service'")
                })?,
                None => {
                    return Err(Error::normalization("Normalization failed")
                        .with_field(key, "must be a string"))
                }
            }
        }
        None => ActorType::default(),
    };

    let occurred_at = match pick(object, &OCCURRED_AT_KEYS) {
        Some((key, value)) => {
            consumed.push(key);
            parse_timestamp(value).ok_or_else(|| {
                Error::normalization("Normalization failed")
                    .with_field(key, "must be an RFC 3339 timestamp or epoch milliseconds")
            })?
        }
        None => ingested_at,
    };

    let resource_type = take_string(object, &RESOURCE_TYPE_KEYS, &mut consumed);
    let mut resource_id = take_string(object, &RESOURCE_ID_KEYS, &mut consumed);
    let ip = take_string(object, &IP_KEYS, &mut consumed);
    let user_agent = take_string(object, &USER_AGENT_KEYS, &mut consumed);

    let bytes = match pick(object, &BYTES_KEYS) {
        Some((key, value)) => {
            consumed.push(key);
            match value.as_i64() {
                Some(n) if n >= 0 => Some(n),
                _ => {
                    return Err(Error::normalization("Normalization failed")
                        .with_field(key, "must be a non-negative integer"))
                }
            }
        }
        None => None,
    };

    let outcome = match pick(object, &OUTCOME_KEYS) {
        Some((key, value)) => {
            consumed.push(key);
            parse_outcome_str(value).ok_or_else(|| {
                Error::normalization("Normalization failed")
                    .with_field(key, "must be one of 'success', 'failure', 'failed', 'error'")
            })?
        }
        None => match pick(object, &SUCCESS_FLAG_KEYS) {
            Some((key, value)) => {
                consumed.push(key);
                match value.as_bool() {
                    Some(true) => EventOutcome::Success,
                    Some(false) => EventOutcome::Failure,
                    None => {
                        return Err(Error::normalization("Normalization failed")
                            .with_field(key, "must be a boolean"))
                    }
                }
            }
            None => EventOutcome::Success,
        },
    };

    if source.redact_resource_id {
        resource_id = resource_id.map(|id| redact(&id));
    }

    let mut metadata = Map::new();
    for (key, value) in object {
        if consumed.iter().any(|c| *c == key.as_str()) || value.is_null() {
            continue;
        }
        metadata.insert(key.clone(), value.clone());
    }

    Ok(Event {
        id: Uuid::new_v4(),
        occurred_at,
        ingested_at,
        actor_id,
        actor_type,
        source_id: source.id,
        action_type,
        resource_type,
        resource_id,
        outcome,
        ip,
        user_agent,
        bytes,
        metadata: Value::Object(metadata),
    })
}

/// One-way redaction of a resource identifier: first 16 hex characters of
/// its SHA-256 digest.
pub fn redact(resource_id: &str) -> String {
    let digest = Sha256::digest(resource_id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..REDACTED_DIGEST_LEN].to_string()
}

fn pick<'a>(object: &'a Map<String, Value>, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    for key in keys {
        if let Some(value) = object.get(*key) {
            if !value.is_null() {
                return Some((key, value));
            }
        }
    }
    None
}

fn take_string(
    object: &Map<String, Value>,
    keys: &[&'static str],
    consumed: &mut Vec<&'static str>,
) -> Option<String> {
    let (key, value) = pick(object, keys)?;
    let s = value.as_str()?;
    consumed.push(key);
    Some(s.to_string())
}

fn non_empty_string(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.trim().is_empty())
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Some(ms) = value.as_i64() {
        return Utc.timestamp_millis_opt(ms).single();
    }
    None
}

fn parse_outcome_str(value: &Value) -> Option<EventOutcome> {
    match value.as_str()? {
        "success" => Some(EventOutcome::Success),
        "failure" | "failed" | "error" => Some(EventOutcome::Failure),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_source(redact: bool) -> Source {
        Source {
            id: Uuid::new_v4(),
            key: "vpn".to_string(),
            name: "Corporate VPN".to_string(),
            description: None,
            api_key_hash: String::new(),
            enabled: true,
            redact_resource_id: redact,
            retention_days: 90,
            rate_limit: 1000,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ingest_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 15, 30, 0).unwrap()
    }

    #[test]
    fn normalizes_vpn_login_payload() {
        let raw = json!({
            "user": "alice@corp",
            "action": "login",
            "timestamp": "2024-06-10T14:00:00Z",
            "ip": "10.0.0.5"
        });

        let source = test_source(false);
        let event = normalize(&raw, &source, ingest_time()).unwrap();

        assert_eq!(event.actor_id, "alice@corp");
        assert_eq!(event.action_type, "login");
        assert_eq!(event.outcome, EventOutcome::Success);
        assert_eq!(event.ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(event.actor_type, ActorType::Employee);
        assert_eq!(
            event.occurred_at,
            Utc.with_ymd_and_hms(2024, 6, 10, 14, 0, 0).unwrap()
        );
        assert_eq!(event.source_id, source.id);
        assert!(!event.id.is_nil());
    }

    #[test]
    fn slot_priority_prefers_earlier_keys() {
        let raw = json!({
            "actorId": "primary@corp",
            "user": "fallback@corp",
            "actionType": "download",
            "action": "ignored"
        });

        let event = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        assert_eq!(event.actor_id, "primary@corp");
        assert_eq!(event.action_type, "download");

        // Losing alternatives are preserved in metadata, not dropped
        assert_eq!(event.metadata["user"], json!("fallback@corp"));
        assert_eq!(event.metadata["action"], json!("ignored"));
    }

    #[test]
    fn missing_required_fields_fail_validation() {
        let problems = validate_payload(&json!({"action": "login"})).unwrap_err();
        assert!(problems.iter().any(|p| p.path.as_deref() == Some("actorId")));

        let problems = validate_payload(&json!({"user": "alice@corp"})).unwrap_err();
        assert!(problems.iter().any(|p| p.path.as_deref() == Some("actionType")));

        assert!(validate_payload(&json!("not an object")).is_err());
        assert!(validate_payload(&json!({"user": "a@corp", "action": "login"})).is_ok());
    }

    #[test]
    fn type_violations_are_reported_per_field() {
        let raw = json!({
            "user": "alice@corp",
            "action": "upload",
            "bytes": -5,
            "outcome": "maybe"
        });

        let problems = validate_payload(&raw).unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.path.as_deref() == Some("bytes")));
        assert!(problems.iter().any(|p| p.path.as_deref() == Some("outcome")));
    }

    #[test]
    fn outcome_mapping() {
        let base = |outcome: Value| {
            let mut raw = json!({"user": "a@corp", "action": "login"});
            raw["outcome"] = outcome;
            normalize(&raw, &test_source(false), ingest_time()).unwrap().outcome
        };

        assert_eq!(base(json!("success")), EventOutcome::Success);
        assert_eq!(base(json!("failure")), EventOutcome::Failure);
        assert_eq!(base(json!("failed")), EventOutcome::Failure);
        assert_eq!(base(json!("error")), EventOutcome::Failure);

        let raw = json!({"user": "a@corp", "action": "login", "success": false});
        let event = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        assert_eq!(event.outcome, EventOutcome::Failure);

        let raw = json!({"user": "a@corp", "action": "login"});
        let event = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        assert_eq!(event.outcome, EventOutcome::Success);
    }

    #[test]
    fn missing_timestamp_uses_ingest_time() {
        let raw = json!({"user": "a@corp", "action": "login"});
        let event = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        assert_eq!(event.occurred_at, ingest_time());
        assert_eq!(event.ingested_at, ingest_time());
    }

    #[test]
    fn epoch_millis_timestamps_accepted() {
        let raw = json!({"user": "a@corp", "action": "login", "timestamp": 1718028000000i64});
        let event = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        assert_eq!(event.occurred_at.timestamp_millis(), 1718028000000);
    }

    #[test]
    fn redaction_hashes_resource_id() {
        let raw = json!({
            "user": "a@corp",
            "action": "read",
            "resourceId": "customers/4711"
        });

        let clear = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        assert_eq!(clear.resource_id.as_deref(), Some("customers/4711"));

        let redacted = normalize(&raw, &test_source(true), ingest_time()).unwrap();
        let id = redacted.resource_id.unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, "customers/4711");

        // Deterministic: same input, same digest
        let again = normalize(&raw, &test_source(true), ingest_time()).unwrap();
        assert_eq!(again.resource_id.unwrap(), id);
    }

    #[test]
    fn unmapped_fields_land_in_metadata_without_nulls() {
        let raw = json!({
            "user": "a@corp",
            "action": "login",
            "sessionId": "s-123",
            "geo": {"country": "DE"},
            "nullish": null
        });

        let event = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        let metadata = event.metadata.as_object().unwrap();
        assert_eq!(metadata.get("sessionId"), Some(&json!("s-123")));
        assert_eq!(metadata.get("geo"), Some(&json!({"country": "DE"})));
        assert!(!metadata.contains_key("nullish"));
        assert!(!metadata.contains_key("user"));
        assert!(!metadata.contains_key("action"));
    }

    #[test]
    fn serde_round_trip_is_identity() {
        let raw = json!({
            "actorId": "svc-backup",
            "actorType": "service",
            "action": "export",
            "timestamp": "2024-06-10T02:15:00+02:00",
            "bytes": 1048576,
            "resourceType": "bucket",
            "resourceId": "backups/primary",
            "userAgent": "backup-agent/2.1",
            "outcome": "failure",
            "tag": "nightly"
        });

        let event = normalize(&raw, &test_source(false), ingest_time()).unwrap();
        let serialized = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, event);
    }
}
