use crate::models::AuditLog;
use crate::Store;
use irm_core::error::Result;
use sqlx::{Postgres, Transaction};

/// Insert an audit record inside an already-open transaction. Used by the
/// audited mutation methods so the record commits or rolls back with the
/// change it describes.
pub(crate) async fn insert_audit_tx(
    tx: &mut Transaction<'static, Postgres>,
    log: &AuditLog,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, action, entity_type, entity_id, before_value,
                                 after_value, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(log.id)
    .bind(&log.user_id)
    .bind(log.action)
    .bind(log.entity_type)
    .bind(&log.entity_id)
    .bind(&log.before_value)
    .bind(&log.after_value)
    .bind(log.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

impl Store {
    /// Standalone audit insert for admin actions that do not pair with a
    /// core entity write (threshold and setting changes).
    pub async fn insert_audit_log(&self, log: &AuditLog) -> Result<()> {
        let mut tx = self.begin().await?;
        insert_audit_tx(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }
}
