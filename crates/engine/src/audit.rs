//! Immutable audit records for admin-initiated configuration changes.
//!
//! Every mutation reaching the core through an admin identity produces an
//! [`irm_store::AuditLog`] row committed in the same transaction as the
//! change itself. The recorder owns the closed-set validation: an unknown
//! action or entity type fails the whole operation before anything is
//! written.

use chrono::Utc;
use irm_core::error::{Error, Result};
use irm_core::{AuditAction, AuditEntityType};
use irm_store::{AuditLog, ScoringRule, Store};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Placeholder recorded instead of credential material on key rotations.
pub const ROTATION_SENTINEL: &str = "[rotated]";

/// A not-yet-validated audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: String,
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    pub before_value: Option<Value>,
    pub after_value: Option<Value>,
}

impl AuditEntry {
    pub fn new(
        user_id: impl Into<String>,
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            before_value: None,
            after_value: None,
        }
    }

    /// Parse an entry from opaque strings handed over by the admin surface.
    /// Unknown actions or entity types are rejected here.
    pub fn from_raw(
        user_id: &str,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        before_value: Option<Value>,
        after_value: Option<Value>,
    ) -> Result<Self> {
        Ok(Self {
            user_id: user_id.to_string(),
            action: action.parse()?,
            entity_type: entity_type.parse()?,
            entity_id: entity_id.to_string(),
            before_value,
            after_value,
        })
    }

    pub fn with_before(mut self, value: Value) -> Self {
        self.before_value = Some(value);
        self
    }

    pub fn with_after(mut self, value: Value) -> Self {
        self.after_value = Some(value);
        self
    }
}

pub struct AuditRecorder {
    store: Store,
}

impl AuditRecorder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Validate an entry and turn it into the immutable row. Credential
    /// rotations are exempt from the one-of-before/after rule and carry
    /// sentinels instead of secret material.
    pub fn build(entry: AuditEntry) -> Result<AuditLog> {
        if entry.user_id.trim().is_empty() {
            return Err(Error::validation("audit records require a user id"));
        }
        if entry.entity_id.trim().is_empty() {
            return Err(Error::validation("audit records require an entity id"));
        }
        if !entry.action.is_credential_rotation()
            && entry.before_value.is_none()
            && entry.after_value.is_none()
        {
            return Err(Error::validation(
                "audit records require at least one of before_value and after_value",
            ));
        }

        Ok(AuditLog {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            before_value: entry.before_value,
            after_value: entry.after_value,
            created_at: Utc::now(),
        })
    }

    /// Record a standalone admin action (threshold or setting updates that
    /// do not pair with a core entity write).
    pub async fn record(&self, entry: AuditEntry) -> Result<AuditLog> {
        let log = Self::build(entry)?;
        self.store.insert_audit_log(&log).await?;

        info!(
            user_id = %log.user_id,
            action = %log.action,
            entity_type = %log.entity_type,
            entity_id = %log.entity_id,
            "Recorded audit log"
        );

        Ok(log)
    }
}

/// Mutable-field patch applied to a scoring rule by an admin.
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub weight: Option<i32>,
    pub threshold: Option<f64>,
    pub window_minutes: Option<i32>,
    pub config: Option<Value>,
}

/// Admin path for rule updates. The rule write and its audit record commit
/// in one transaction.
pub struct RuleAdmin {
    store: Store,
}

impl RuleAdmin {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn update_rule(
        &self,
        admin_id: &str,
        rule_id: Uuid,
        patch: RulePatch,
    ) -> Result<ScoringRule> {
        let before = self
            .store
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("scoring rule {} not found", rule_id)))?;

        let mut after = before.clone();
        if let Some(name) = patch.name {
            after.name = name;
        }
        if let Some(description) = patch.description {
            after.description = Some(description);
        }
        if let Some(enabled) = patch.enabled {
            after.enabled = enabled;
        }
        if let Some(weight) = patch.weight {
            if weight <= 0 {
                return Err(Error::validation("rule weight must be positive"));
            }
            after.weight = weight;
        }
        if let Some(threshold) = patch.threshold {
            if threshold <= 0.0 {
                return Err(Error::validation("rule threshold must be positive"));
            }
            after.threshold = threshold;
        }
        if let Some(window_minutes) = patch.window_minutes {
            if window_minutes <= 0 {
                return Err(Error::validation("rule window must be positive"));
            }
            after.window_minutes = window_minutes;
        }
        if let Some(config) = patch.config {
            after.config = config;
        }
        after.updated_at = Utc::now();

        let audit = AuditRecorder::build(
            AuditEntry::new(
                admin_id,
                AuditAction::RuleUpdated,
                AuditEntityType::ScoringRule,
                rule_id.to_string(),
            )
            .with_before(serde_json::to_value(&before)?)
            .with_after(serde_json::to_value(&after)?),
        )?;

        let updated = self.store.update_rule_audited(&after, &audit).await?;

        info!(rule_key = %updated.rule_key, admin = %admin_id, "Scoring rule updated");

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_requires_user_and_entity() {
        let entry = AuditEntry::new("", AuditAction::SourceUpdated, AuditEntityType::Source, "s-1")
            .with_after(json!({"enabled": false}));
        assert!(AuditRecorder::build(entry).is_err());

        let entry = AuditEntry::new("admin@corp", AuditAction::SourceUpdated, AuditEntityType::Source, "")
            .with_after(json!({"enabled": false}));
        assert!(AuditRecorder::build(entry).is_err());
    }

    #[test]
    fn build_requires_before_or_after_except_rotation() {
        let bare = AuditEntry::new(
            "admin@corp",
            AuditAction::SourceUpdated,
            AuditEntityType::Source,
            "s-1",
        );
        assert!(AuditRecorder::build(bare).is_err());

        let rotation = AuditEntry::new(
            "admin@corp",
            AuditAction::SourceApiKeyRotated,
            AuditEntityType::Source,
            "s-1",
        );
        let log = AuditRecorder::build(rotation).unwrap();
        assert!(log.before_value.is_none());
        assert!(log.after_value.is_none());
    }

    #[test]
    fn from_raw_rejects_unknown_vocabulary() {
        assert!(AuditEntry::from_raw("admin", "source_created", "Source", "s-1", None, Some(json!({}))).is_ok());
        assert!(AuditEntry::from_raw("admin", "source_destroyed", "Source", "s-1", None, Some(json!({}))).is_err());
        assert!(AuditEntry::from_raw("admin", "source_created", "Widget", "s-1", None, Some(json!({}))).is_err());
    }

    #[test]
    fn rotation_sentinels_never_carry_secrets() {
        let entry = AuditEntry::new(
            "admin@corp",
            AuditAction::SourceApiKeyRotated,
            AuditEntityType::Source,
            "s-1",
        )
        .with_before(json!(ROTATION_SENTINEL))
        .with_after(json!(ROTATION_SENTINEL));

        let log = AuditRecorder::build(entry).unwrap();
        assert_eq!(log.before_value, Some(json!("[rotated]")));
        assert_eq!(log.after_value, Some(json!("[rotated]")));
    }
}
