use crate::models::Event;
use crate::Store;
use chrono::{DateTime, Utc};
use irm_core::error::Result;
use uuid::Uuid;

impl Store {
    /// Persist a normalized event and refresh its actor, atomically. The
    /// event insert strictly precedes the actor upsert inside one
    /// transaction; `first_seen` takes the minimum, `last_seen` the event's
    /// own timestamp, and `actor_type` is only set on creation.
    pub async fn record_event(&self, event: &Event) -> Result<Uuid> {
        let mut tx = self.begin().await?;

        sqlx::query(
            "INSERT INTO events (id, occurred_at, ingested_at, actor_id, actor_type, source_id,
                                 action_type, resource_type, resource_id, outcome, ip, user_agent,
                                 bytes, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(event.id)
        .bind(event.occurred_at)
        .bind(event.ingested_at)
        .bind(&event.actor_id)
        .bind(event.actor_type)
        .bind(event.source_id)
        .bind(&event.action_type)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.outcome)
        .bind(&event.ip)
        .bind(&event.user_agent)
        .bind(event.bytes)
        .bind(&event.metadata)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO actors (actor_id, actor_type, first_seen, last_seen, current_risk_score)
             VALUES ($1, $2, $3, $3, 0)
             ON CONFLICT (actor_id) DO UPDATE
             SET last_seen = EXCLUDED.last_seen,
                 first_seen = LEAST(actors.first_seen, EXCLUDED.first_seen)",
        )
        .bind(&event.actor_id)
        .bind(event.actor_type)
        .bind(event.occurred_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(event.id)
    }

    pub async fn events_for_actor_since(
        &self,
        actor_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE actor_id = $1 AND occurred_at >= $2 ORDER BY occurred_at, id",
        )
        .bind(actor_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Distinct actors with any activity since the cutoff; drives both the
    /// baseline batch and the scoring pass.
    pub async fn actor_ids_with_events_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT actor_id FROM events WHERE occurred_at >= $1 ORDER BY actor_id",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    pub async fn count_events_for_source_before(
        &self,
        source_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE source_id = $1 AND occurred_at < $2",
        )
        .bind(source_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    pub async fn delete_events_for_source_before(
        &self,
        source_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE source_id = $1 AND occurred_at < $2")
            .bind(source_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Events whose source no longer exists, older than the fallback cutoff.
    pub async fn count_orphaned_events_before(
        &self,
        known_source_ids: &[Uuid],
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE occurred_at < $2 AND source_id <> ALL($1)",
        )
        .bind(known_source_ids)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    pub async fn delete_orphaned_events_before(
        &self,
        known_source_ids: &[Uuid],
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM events WHERE occurred_at < $2 AND source_id <> ALL($1)",
        )
        .bind(known_source_ids)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
