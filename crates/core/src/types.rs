//! Closed-set domain types shared across the pipeline.
//!
//! Every enum here is a fixed vocabulary: serialization happens only at the
//! serde/sqlx boundary, and parsing an unknown value is a validation error
//! rather than a silent fallback.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of identity an event is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActorType {
    Employee,
    Service,
}

impl Default for ActorType {
    fn default() -> Self {
        ActorType::Employee
    }
}

/// Whether the source reported the action as succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EventOutcome {
    Success,
    Failure,
}

/// Severity bucket attached to a numeric risk score for human triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Bucket a score into its severity. Scores of 90+ are critical,
    /// 80-89 high, 70-79 medium, everything below that low (alert gating
    /// is handled separately by the configured threshold).
    pub fn for_score(score: u32) -> AlertSeverity {
        match score {
            90..=u32::MAX => AlertSeverity::Critical,
            80..=89 => AlertSeverity::High,
            70..=79 => AlertSeverity::Medium,
            _ => AlertSeverity::Low,
        }
    }
}

/// Triage state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    /// Status transitions form a DAG: open alerts may be acknowledged,
    /// resolved, or marked false positive; acknowledged alerts may be
    /// resolved or marked false positive; terminal states accept nothing.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::Open, AlertStatus::Acknowledged)
                | (AlertStatus::Open, AlertStatus::Resolved)
                | (AlertStatus::Open, AlertStatus::FalsePositive)
                | (AlertStatus::Acknowledged, AlertStatus::Resolved)
                | (AlertStatus::Acknowledged, AlertStatus::FalsePositive)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::FalsePositive)
    }
}

/// Stable identifiers of the fixed scoring rule set, in canonical
/// definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RuleKey {
    OffHours,
    NewIp,
    VolumeSpike,
    ScopeExpansion,
    FailureBurst,
}

impl RuleKey {
    /// Canonical evaluation/definition order. Contributions are emitted in
    /// this order regardless of how rules arrive from the store.
    pub const ORDER: [RuleKey; 5] = [
        RuleKey::OffHours,
        RuleKey::NewIp,
        RuleKey::VolumeSpike,
        RuleKey::ScopeExpansion,
        RuleKey::FailureBurst,
    ];
}

/// Admin mutation kinds recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditAction {
    RuleUpdated,
    SourceCreated,
    SourceUpdated,
    SourceApiKeyRotated,
    ThresholdUpdated,
    SettingUpdated,
}

impl AuditAction {
    /// Credential rotations never record secret material; before/after are
    /// sentinel values and the usual one-of-before/after rule is waived.
    pub fn is_credential_rotation(&self) -> bool {
        matches!(self, AuditAction::SourceApiKeyRotated)
    }
}

/// Entity kinds an audit record may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "PascalCase")]
#[sqlx(rename_all = "PascalCase")]
pub enum AuditEntityType {
    ScoringRule,
    Source,
    SystemSetting,
}

macro_rules! string_boundary {
    ($ty:ident, $( $variant:path => $text:literal ),+ $(,)?) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $( $variant => $text, )+
                };
                f.write_str(s)
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $( $text => Ok($variant), )+
                    other => Err(Error::validation(format!(
                        concat!("unknown ", stringify!($ty), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

string_boundary!(ActorType,
    ActorType::Employee => "employee",
    ActorType::Service => "service",
);

string_boundary!(EventOutcome,
    EventOutcome::Success => "success",
    EventOutcome::Failure => "failure",
);

string_boundary!(AlertSeverity,
    AlertSeverity::Low => "low",
    AlertSeverity::Medium => "medium",
    AlertSeverity::High => "high",
    AlertSeverity::Critical => "critical",
);

string_boundary!(AlertStatus,
    AlertStatus::Open => "open",
    AlertStatus::Acknowledged => "acknowledged",
    AlertStatus::Resolved => "resolved",
    AlertStatus::FalsePositive => "false_positive",
);

string_boundary!(RuleKey,
    RuleKey::OffHours => "off_hours",
    RuleKey::NewIp => "new_ip",
    RuleKey::VolumeSpike => "volume_spike",
    RuleKey::ScopeExpansion => "scope_expansion",
    RuleKey::FailureBurst => "failure_burst",
);

string_boundary!(AuditAction,
    AuditAction::RuleUpdated => "rule_updated",
    AuditAction::SourceCreated => "source_created",
    AuditAction::SourceUpdated => "source_updated",
    AuditAction::SourceApiKeyRotated => "source_api_key_rotated",
    AuditAction::ThresholdUpdated => "threshold_updated",
    AuditAction::SettingUpdated => "setting_updated",
);

string_boundary!(AuditEntityType,
    AuditEntityType::ScoringRule => "ScoringRule",
    AuditEntityType::Source => "Source",
    AuditEntityType::SystemSetting => "SystemSetting",
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_buckets() {
        assert_eq!(AlertSeverity::for_score(0), AlertSeverity::Low);
        assert_eq!(AlertSeverity::for_score(60), AlertSeverity::Low);
        assert_eq!(AlertSeverity::for_score(69), AlertSeverity::Low);
        assert_eq!(AlertSeverity::for_score(70), AlertSeverity::Medium);
        assert_eq!(AlertSeverity::for_score(79), AlertSeverity::Medium);
        assert_eq!(AlertSeverity::for_score(80), AlertSeverity::High);
        assert_eq!(AlertSeverity::for_score(89), AlertSeverity::High);
        assert_eq!(AlertSeverity::for_score(90), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::for_score(100), AlertSeverity::Critical);
    }

    #[test]
    fn status_transitions_form_a_dag() {
        use AlertStatus::*;

        assert!(Open.can_transition_to(Acknowledged));
        assert!(Open.can_transition_to(Resolved));
        assert!(Open.can_transition_to(FalsePositive));
        assert!(Acknowledged.can_transition_to(Resolved));
        assert!(Acknowledged.can_transition_to(FalsePositive));

        assert!(!Acknowledged.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Acknowledged));
        assert!(!FalsePositive.can_transition_to(Resolved));
        assert!(!Open.can_transition_to(Open));
    }

    #[test]
    fn string_round_trips() {
        for key in RuleKey::ORDER {
            assert_eq!(key.to_string().parse::<RuleKey>().unwrap(), key);
        }
        assert_eq!("employee".parse::<ActorType>().unwrap(), ActorType::Employee);
        assert_eq!("false_positive".parse::<AlertStatus>().unwrap(), AlertStatus::FalsePositive);
        assert_eq!("ScoringRule".parse::<AuditEntityType>().unwrap(), AuditEntityType::ScoringRule);
        assert!("supervisor".parse::<ActorType>().is_err());
        assert!("maybe".parse::<EventOutcome>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&AlertStatus::FalsePositive).unwrap();
        assert_eq!(json, "\"false_positive\"");
        let back: AlertStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AlertStatus::FalsePositive);

        let json = serde_json::to_string(&RuleKey::OffHours).unwrap();
        assert_eq!(json, "\"off_hours\"");
    }
}
