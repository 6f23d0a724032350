//! Source lifecycle: creation, mutation, credential rotation, verification.
//!
//! The plaintext API key exists exactly once, in the return value of
//! `create` and `rotate_api_key`; only its Argon2id hash is stored. Every
//! admin mutation commits its audit record in the same transaction as the
//! change.

use chrono::Utc;
use irm_core::error::{Error, FieldError, Result};
use irm_core::{generate_api_key, ApiKeyHasher, AuditAction, AuditEntityType};
use irm_store::{Source, SourcePatch, Store};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::audit::{AuditEntry, AuditRecorder, ROTATION_SENTINEL};

/// Source keys are URL path segments; keep them lowercase and URL-safe.
static SOURCE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("source key pattern"));

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSourceRequest {
    #[validate(length(min = 1, max = 64))]
    pub key: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub redact_resource_id: bool,
    #[serde(default = "default_retention_days")]
    #[validate(range(min = 1))]
    pub retention_days: i32,
    #[serde(default = "default_rate_limit")]
    #[validate(range(min = 1))]
    pub rate_limit: i32,
}

fn default_retention_days() -> i32 {
    90
}

fn default_rate_limit() -> i32 {
    1000
}

/// A source together with its one-time plaintext credential.
#[derive(Debug, Clone)]
pub struct CreatedSource {
    pub source: Source,
    pub api_key: String,
}

#[derive(Clone)]
pub struct SourceRegistry {
    store: Store,
    hasher: ApiKeyHasher,
}

impl SourceRegistry {
    pub fn new(store: Store, hasher: ApiKeyHasher) -> Self {
        Self { store, hasher }
    }

    /// Register a new source and mint its credential. Fails with
    /// `DuplicateKey` when the key is taken.
    pub async fn create(&self, admin_id: &str, request: CreateSourceRequest) -> Result<CreatedSource> {
        request
            .validate()
            .map_err(|e| Error::validation("Validation failed").with_fields(validator_fields(&e)))?;

        if !SOURCE_KEY_RE.is_match(&request.key) {
            return Err(Error::validation("Validation failed").with_field(
                "key",
                "must be lowercase URL-safe: letters, digits, '-', '_'",
            ));
        }

        let api_key = generate_api_key();
        let api_key_hash = self.hasher.hash_key(&api_key)?;
        let now = Utc::now();

        let source = Source {
            id: Uuid::new_v4(),
            key: request.key,
            name: request.name,
            description: request.description,
            api_key_hash,
            enabled: true,
            redact_resource_id: request.redact_resource_id,
            retention_days: request.retention_days,
            rate_limit: request.rate_limit,
            created_at: now,
            updated_at: now,
        };

        let audit = AuditRecorder::build(
            AuditEntry::new(
                admin_id,
                AuditAction::SourceCreated,
                AuditEntityType::Source,
                source.id.to_string(),
            )
            .with_after(serde_json::to_value(&source)?),
        )?;

        let created = self.store.insert_source_audited(&source, &audit).await?;

        info!(source_key = %created.key, source_id = %created.id, "Source created");

        Ok(CreatedSource {
            source: created,
            api_key,
        })
    }

    /// Update mutable fields. The key is immutable after creation.
    pub async fn update(&self, admin_id: &str, id: Uuid, patch: SourcePatch) -> Result<Source> {
        let before = self
            .store
            .get_source(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("source {} not found", id)))?;

        let mut after = before.clone();
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(Error::validation("source name must not be empty"));
            }
            after.name = name;
        }
        if let Some(description) = patch.description {
            after.description = Some(description);
        }
        if let Some(enabled) = patch.enabled {
            after.enabled = enabled;
        }
        if let Some(redact) = patch.redact_resource_id {
            after.redact_resource_id = redact;
        }
        if let Some(retention_days) = patch.retention_days {
            if retention_days < 1 {
                return Err(Error::validation("retention_days must be positive"));
            }
            after.retention_days = retention_days;
        }
        if let Some(rate_limit) = patch.rate_limit {
            if rate_limit < 1 {
                return Err(Error::validation("rate_limit must be positive"));
            }
            after.rate_limit = rate_limit;
        }
        after.updated_at = Utc::now();

        let audit = AuditRecorder::build(
            AuditEntry::new(
                admin_id,
                AuditAction::SourceUpdated,
                AuditEntityType::Source,
                id.to_string(),
            )
            .with_before(serde_json::to_value(&before)?)
            .with_after(serde_json::to_value(&after)?),
        )?;

        let updated = self.store.update_source_audited(&after, &audit).await?;

        info!(source_key = %updated.key, source_id = %updated.id, "Source updated");

        Ok(updated)
    }

    /// Mint a fresh credential; the old one stops verifying the moment the
    /// transaction commits. Audit before/after are sentinels, never keys.
    pub async fn rotate_api_key(&self, admin_id: &str, id: Uuid) -> Result<CreatedSource> {
        let source = self
            .store
            .get_source(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("source {} not found", id)))?;

        let api_key = generate_api_key();
        let api_key_hash = self.hasher.hash_key(&api_key)?;
        let now = Utc::now();

        let audit = AuditRecorder::build(
            AuditEntry::new(
                admin_id,
                AuditAction::SourceApiKeyRotated,
                AuditEntityType::Source,
                id.to_string(),
            )
            .with_before(json!(ROTATION_SENTINEL))
            .with_after(json!(ROTATION_SENTINEL)),
        )?;

        let updated = self
            .store
            .rotate_source_key_audited(id, &api_key_hash, now, &audit)
            .await?;

        info!(source_key = %source.key, source_id = %id, "Source API key rotated");

        Ok(CreatedSource {
            source: updated,
            api_key,
        })
    }

    /// Resolve a presented credential to its source. Returns `None` for an
    /// unknown key, a non-matching secret, or a disabled source; all three
    /// burn a full hash verification so rejections share a timing class.
    pub async fn verify(&self, source_key: &str, presented_api_key: &str) -> Result<Option<Source>> {
        let Some(source) = self.store.get_source_by_key(source_key).await? else {
            self.hasher.verify_decoy(presented_api_key);
            return Ok(None);
        };

        let matches = self.hasher.verify_key(presented_api_key, &source.api_key_hash)?;

        if !matches {
            return Ok(None);
        }

        if !source.enabled {
            warn!(source_key = %source.key, "Credential presented for disabled source");
            return Ok(None);
        }

        Ok(Some(source))
    }
}

fn validator_fields(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                FieldError::new(
                    field.to_string(),
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed {} validation", e.code)),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_pattern() {
        for good in ["vpn", "iam-prod", "app_logs", "s3", "0day-feed"] {
            assert!(SOURCE_KEY_RE.is_match(good), "{} should be accepted", good);
        }
        for bad in ["", "VPN", "has space", "säure", "-leading", "a/b"] {
            assert!(!SOURCE_KEY_RE.is_match(bad), "{} should be rejected", bad);
        }
    }

    #[test]
    fn create_request_defaults() {
        let request: CreateSourceRequest =
            serde_json::from_value(json!({"key": "vpn", "name": "Corporate VPN"})).unwrap();
        assert!(!request.redact_resource_id);
        assert_eq!(request.retention_days, 90);
        assert_eq!(request.rate_limit, 1000);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn create_request_rejects_bad_ranges() {
        let request: CreateSourceRequest = serde_json::from_value(
            json!({"key": "vpn", "name": "Corporate VPN", "retention_days": 0}),
        )
        .unwrap();
        assert!(request.validate().is_err());

        let request: CreateSourceRequest = serde_json::from_value(
            json!({"key": "vpn", "name": "", "rate_limit": 100}),
        )
        .unwrap();
        assert!(request.validate().is_err());
    }
}
