use chrono::{DateTime, Utc};
use irm_core::{ActorType, AlertSeverity, AlertStatus, AuditAction, AuditEntityType, EventOutcome, RuleKey};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// An upstream emitter (VPN concentrator, IAM service, application log
/// shipper). `key` is immutable after creation; the plaintext API key exists
/// only in the create/rotate response and is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Source {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing, default)]
    pub api_key_hash: String,
    pub enabled: bool,
    pub redact_resource_id: bool,
    pub retention_days: i32,
    pub rate_limit: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable-field patch applied by `SourceRegistry::update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub redact_resource_id: Option<bool>,
    pub retention_days: Option<i32>,
    pub rate_limit: Option<i32>,
}

/// The subject of events. Created or refreshed on every successful
/// ingestion; never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Actor {
    pub actor_id: String,
    pub display_name: Option<String>,
    pub actor_type: ActorType,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub current_risk_score: i32,
}

/// Canonical normalized event. Immutable once written; `id` and
/// `ingested_at` are assigned by the core, never by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub source_id: Uuid,
    pub action_type: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub outcome: EventOutcome,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub bytes: Option<i64>,
    pub metadata: serde_json::Value,
}

/// Behavioral profile of an actor over a rolling window. Append-only; a new
/// record is written per computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Baseline {
    pub id: Uuid,
    pub actor_id: String,
    pub computed_at: DateTime<Utc>,
    pub window_days: i32,
    pub typical_active_hours: Vec<i32>,
    pub known_ip_addresses: Vec<String>,
    pub known_user_agents: Vec<String>,
    pub avg_bytes_per_day: f64,
    pub avg_events_per_day: f64,
    pub typical_resource_scope: i32,
    pub normal_failure_rate: f64,
    pub event_count: i32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One rule's explainable addition to a risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleContribution {
    pub rule_id: Uuid,
    pub rule_key: RuleKey,
    pub rule_name: String,
    pub points: u32,
    pub reason: String,
    pub current_value: serde_json::Value,
    pub baseline_value: serde_json::Value,
}

/// Paired baseline-vs-window metrics carried on alerts for triage display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BaselineComparison {
    pub typical_hours: Vec<i32>,
    pub current_hours: Vec<i32>,
    pub avg_bytes: f64,
    pub current_bytes: f64,
    pub normal_scope: f64,
    pub current_scope: f64,
    pub normal_failure_rate: f64,
    pub current_failure_rate: f64,
}

/// Evidentiary output of one scoring pass. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RiskScore {
    pub id: Uuid,
    pub actor_id: String,
    pub total_score: i32,
    pub computed_at: DateTime<Utc>,
    pub rule_contributions: Json<Vec<RuleContribution>>,
    pub triggering_event_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub actor_id: String,
    pub score: i32,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub rule_contributions: Json<Vec<RuleContribution>>,
    pub baseline_comparison: Json<BaselineComparison>,
    pub triggering_event_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Configuration of one scoring rule. `rule_key` is one of the fixed set;
/// `weight` caps the points the rule can award.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScoringRule {
    pub id: Uuid,
    pub rule_key: RuleKey,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub weight: i32,
    pub threshold: f64,
    pub window_minutes: i32,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of one admin-initiated configuration change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: String,
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    pub before_value: Option<serde_json::Value>,
    pub after_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn source_serialization_never_exposes_the_hash() {
        let source = Source {
            id: Uuid::new_v4(),
            key: "vpn".to_string(),
            name: "Corporate VPN".to_string(),
            description: None,
            api_key_hash: "$argon2id$v=19$secret".to_string(),
            enabled: true,
            redact_resource_id: false,
            retention_days: 90,
            rate_limit: 1000,
            created_at: now(),
            updated_at: now(),
        };

        let value = serde_json::to_value(&source).unwrap();
        assert!(value.get("api_key_hash").is_none());
        assert_eq!(value["key"], json!("vpn"));
    }

    #[test]
    fn source_patch_accepts_partial_documents() {
        let patch: SourcePatch =
            serde_json::from_value(json!({"enabled": false, "retention_days": 30})).unwrap();
        assert_eq!(patch.enabled, Some(false));
        assert_eq!(patch.retention_days, Some(30));
        assert!(patch.name.is_none());
        assert!(patch.rate_limit.is_none());
    }

    #[test]
    fn rule_contribution_round_trips() {
        let contribution = RuleContribution {
            rule_id: Uuid::new_v4(),
            rule_key: RuleKey::VolumeSpike,
            rule_name: "Volume spike".to_string(),
            points: 25,
            reason: "100 MiB against a 10 MiB baseline".to_string(),
            current_value: json!(104857600i64),
            baseline_value: json!(10485760.0),
        };

        let serialized = serde_json::to_string(&contribution).unwrap();
        assert!(serialized.contains("\"volume_spike\""));

        let back: RuleContribution = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, contribution);
    }

    #[test]
    fn baseline_comparison_carries_all_paired_fields() {
        let comparison = BaselineComparison {
            typical_hours: vec![9, 10, 11],
            current_hours: vec![2],
            avg_bytes: 1024.0,
            current_bytes: 4096.0,
            normal_scope: 20.0,
            current_scope: 3.0,
            normal_failure_rate: 0.05,
            current_failure_rate: 0.5,
        };

        let value = serde_json::to_value(&comparison).unwrap();
        for field in [
            "typical_hours",
            "current_hours",
            "avg_bytes",
            "current_bytes",
            "normal_scope",
            "current_scope",
            "normal_failure_rate",
            "current_failure_rate",
        ] {
            assert!(value.get(field).is_some(), "{} missing", field);
        }

        let back: BaselineComparison = serde_json::from_value(value).unwrap();
        assert_eq!(back, comparison);
    }
}
