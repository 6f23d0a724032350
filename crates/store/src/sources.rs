use crate::audit::insert_audit_tx;
use crate::models::{AuditLog, Source};
use crate::Store;
use irm_core::error::{Error, Result};
use uuid::Uuid;

impl Store {
    /// Insert a new source together with its audit record, atomically.
    /// A taken `key` surfaces as `DuplicateKey`.
    pub async fn insert_source_audited(&self, source: &Source, audit: &AuditLog) -> Result<Source> {
        let mut tx = self.begin().await?;

        let created = sqlx::query_as::<_, Source>(
            "INSERT INTO sources (id, key, name, description, api_key_hash, enabled,
                                  redact_resource_id, retention_days, rate_limit, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING *",
        )
        .bind(source.id)
        .bind(&source.key)
        .bind(&source.name)
        .bind(&source.description)
        .bind(&source.api_key_hash)
        .bind(source.enabled)
        .bind(source.redact_resource_id)
        .bind(source.retention_days)
        .bind(source.rate_limit)
        .bind(source.created_at)
        .bind(source.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Error::conflict(format!("source key '{}' already exists", source.key));
                }
            }
            Error::from(e)
        })?;

        insert_audit_tx(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(created)
    }

    /// Apply updated mutable fields together with the audit record. The
    /// `key` column is deliberately absent from the UPDATE; it is immutable.
    pub async fn update_source_audited(&self, source: &Source, audit: &AuditLog) -> Result<Source> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query_as::<_, Source>(
            "UPDATE sources
             SET name = $2, description = $3, enabled = $4, redact_resource_id = $5,
                 retention_days = $6, rate_limit = $7, updated_at = $8
             WHERE id = $1
             RETURNING *",
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(&source.description)
        .bind(source.enabled)
        .bind(source.redact_resource_id)
        .bind(source.retention_days)
        .bind(source.rate_limit)
        .bind(source.updated_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("source {} not found", source.id)))?;

        insert_audit_tx(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Swap in a freshly generated credential hash; the old credential
    /// becomes invalid the instant the transaction commits.
    pub async fn rotate_source_key_audited(
        &self,
        id: Uuid,
        new_hash: &str,
        updated_at: chrono::DateTime<chrono::Utc>,
        audit: &AuditLog,
    ) -> Result<Source> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query_as::<_, Source>(
            "UPDATE sources SET api_key_hash = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(new_hash)
        .bind(updated_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("source {} not found", id)))?;

        insert_audit_tx(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(updated)
    }

    pub async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(source)
    }

    /// Lookup by stable key. Disabled sources are returned; credential
    /// verification decides what to do with them.
    pub async fn get_source_by_key(&self, key: &str) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(source)
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>("SELECT * FROM sources ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(sources)
    }
}
