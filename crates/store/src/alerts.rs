use crate::models::Alert;
use crate::Store;
use chrono::{DateTime, Utc};
use irm_core::error::{Error, Result};
use irm_core::AlertStatus;
use uuid::Uuid;

impl Store {
    pub async fn insert_alert(&self, alert: &Alert) -> Result<Alert> {
        let created = sqlx::query_as::<_, Alert>(
            "INSERT INTO alerts (id, actor_id, score, severity, status, rule_contributions,
                                 baseline_comparison, triggering_event_ids, created_at, updated_at,
                                 acknowledged_by, acknowledged_at, resolved_by, resolved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING *",
        )
        .bind(alert.id)
        .bind(&alert.actor_id)
        .bind(alert.score)
        .bind(alert.severity)
        .bind(alert.status)
        .bind(&alert.rule_contributions)
        .bind(&alert.baseline_comparison)
        .bind(&alert.triggering_event_ids)
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .bind(&alert.acknowledged_by)
        .bind(alert.acknowledged_at)
        .bind(&alert.resolved_by)
        .bind(alert.resolved_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(alert)
    }

    /// The deduplication probe: any still-open alert for this actor created
    /// inside the window suppresses a new one.
    pub async fn find_open_alert_since(
        &self,
        actor_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts
             WHERE actor_id = $1 AND status = $2 AND created_at >= $3
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(actor_id)
        .bind(AlertStatus::Open)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(alert)
    }

    /// Persist the triage fields after a status transition.
    pub async fn save_alert_triage(&self, alert: &Alert) -> Result<Alert> {
        let updated = sqlx::query_as::<_, Alert>(
            "UPDATE alerts
             SET status = $2, updated_at = $3, acknowledged_by = $4, acknowledged_at = $5,
                 resolved_by = $6, resolved_at = $7
             WHERE id = $1
             RETURNING *",
        )
        .bind(alert.id)
        .bind(alert.status)
        .bind(alert.updated_at)
        .bind(&alert.acknowledged_by)
        .bind(alert.acknowledged_at)
        .bind(&alert.resolved_by)
        .bind(alert.resolved_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("alert {} not found", alert.id)))?;

        Ok(updated)
    }
}
