use crate::models::Baseline;
use crate::Store;
use irm_core::error::Result;

impl Store {
    /// Baselines are append-only: every computation inserts a fresh row.
    pub async fn insert_baseline(&self, baseline: &Baseline) -> Result<()> {
        sqlx::query(
            "INSERT INTO baselines (id, actor_id, computed_at, window_days, typical_active_hours,
                                    known_ip_addresses, known_user_agents, avg_bytes_per_day,
                                    avg_events_per_day, typical_resource_scope, normal_failure_rate,
                                    event_count, first_seen, last_seen)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(baseline.id)
        .bind(&baseline.actor_id)
        .bind(baseline.computed_at)
        .bind(baseline.window_days)
        .bind(&baseline.typical_active_hours)
        .bind(&baseline.known_ip_addresses)
        .bind(&baseline.known_user_agents)
        .bind(baseline.avg_bytes_per_day)
        .bind(baseline.avg_events_per_day)
        .bind(baseline.typical_resource_scope)
        .bind(baseline.normal_failure_rate)
        .bind(baseline.event_count)
        .bind(baseline.first_seen)
        .bind(baseline.last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn latest_baseline_for_actor(&self, actor_id: &str) -> Result<Option<Baseline>> {
        let baseline = sqlx::query_as::<_, Baseline>(
            "SELECT * FROM baselines WHERE actor_id = $1 ORDER BY computed_at DESC LIMIT 1",
        )
        .bind(actor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(baseline)
    }

    pub async fn count_baselines(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM baselines")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}
