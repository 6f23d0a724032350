use crate::audit::insert_audit_tx;
use crate::models::{AuditLog, ScoringRule};
use crate::Store;
use irm_core::error::{Error, Result};
use uuid::Uuid;

impl Store {
    pub async fn list_rules(&self) -> Result<Vec<ScoringRule>> {
        let rules = sqlx::query_as::<_, ScoringRule>("SELECT * FROM scoring_rules ORDER BY rule_key")
            .fetch_all(&self.pool)
            .await?;

        Ok(rules)
    }

    pub async fn get_rule(&self, id: Uuid) -> Result<Option<ScoringRule>> {
        let rule = sqlx::query_as::<_, ScoringRule>("SELECT * FROM scoring_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(rule)
    }

    /// Install the fixed rule set on first boot; existing rows (possibly
    /// tuned by operators) are left untouched.
    pub async fn seed_rules(&self, defaults: &[ScoringRule]) -> Result<u64> {
        let mut inserted = 0;

        for rule in defaults {
            let result = sqlx::query(
                "INSERT INTO scoring_rules (id, rule_key, name, description, enabled, weight,
                                            threshold, window_minutes, config, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (rule_key) DO NOTHING",
            )
            .bind(rule.id)
            .bind(rule.rule_key)
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(rule.enabled)
            .bind(rule.weight)
            .bind(rule.threshold)
            .bind(rule.window_minutes)
            .bind(&rule.config)
            .bind(rule.created_at)
            .bind(rule.updated_at)
            .execute(&self.pool)
            .await?;

            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    /// Apply a rule update together with its audit record, atomically.
    /// `rule_key` is immutable.
    pub async fn update_rule_audited(&self, rule: &ScoringRule, audit: &AuditLog) -> Result<ScoringRule> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query_as::<_, ScoringRule>(
            "UPDATE scoring_rules
             SET name = $2, description = $3, enabled = $4, weight = $5, threshold = $6,
                 window_minutes = $7, config = $8, updated_at = $9
             WHERE id = $1
             RETURNING *",
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.enabled)
        .bind(rule.weight)
        .bind(rule.threshold)
        .bind(rule.window_minutes)
        .bind(&rule.config)
        .bind(rule.updated_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("scoring rule {} not found", rule.id)))?;

        insert_audit_tx(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(updated)
    }
}
