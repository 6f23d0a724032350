//! Per-source event expiry.
//!
//! Each source carries its own retention horizon; events older than the
//! horizon are deleted on the daily pass. Events whose source has been
//! deleted fall back to the system default horizon. Baselines are derived
//! artifacts and are never deleted, whatever their age.

use chrono::{DateTime, Duration, Utc};
use irm_core::error::Result;
use irm_store::Store;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RetentionOptions {
    pub default_retention_days: i64,
    pub dry_run: bool,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        Self {
            default_retention_days: 90,
            dry_run: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct RetentionReport {
    pub total_events_deleted: u64,
    pub sources_processed: usize,
    pub deletions_by_source: BTreeMap<String, u64>,
    pub orphaned_events_deleted: u64,
    pub baselines_preserved: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Retention horizon arithmetic is in whole days; the cutoff is always
/// strictly before the reference instant.
pub fn cutoff(retention_days: i64, reference: DateTime<Utc>) -> DateTime<Utc> {
    reference - Duration::days(retention_days.max(1))
}

#[derive(Clone)]
pub struct RetentionEngine {
    store: Store,
}

impl RetentionEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// One full cleanup pass. Store failures surface in the report rather
    /// than as an error; the scheduler logs and retries on the next tick.
    pub async fn run_retention_cleanup(&self, options: &RetentionOptions) -> RetentionReport {
        match self.cleanup_inner(options).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Retention cleanup failed");
                RetentionReport {
                    success: false,
                    error: Some(e.to_string()),
                    ..RetentionReport::default()
                }
            }
        }
    }

    async fn cleanup_inner(&self, options: &RetentionOptions) -> Result<RetentionReport> {
        let now = Utc::now();
        let sources = self.store.list_sources().await?;

        let mut report = RetentionReport {
            success: true,
            ..RetentionReport::default()
        };

        let mut known_ids: Vec<Uuid> = Vec::with_capacity(sources.len());

        for source in &sources {
            known_ids.push(source.id);
            let source_cutoff = cutoff(source.retention_days as i64, now);

            let affected = if options.dry_run {
                self.store
                    .count_events_for_source_before(source.id, source_cutoff)
                    .await?
            } else {
                self.store
                    .delete_events_for_source_before(source.id, source_cutoff)
                    .await?
            };

            report.sources_processed += 1;
            report.total_events_deleted += affected;
            report.deletions_by_source.insert(source.key.clone(), affected);
        }

        let orphan_cutoff = cutoff(options.default_retention_days, now);
        report.orphaned_events_deleted = if options.dry_run {
            self.store
                .count_orphaned_events_before(&known_ids, orphan_cutoff)
                .await?
        } else {
            self.store
                .delete_orphaned_events_before(&known_ids, orphan_cutoff)
                .await?
        };
        report.total_events_deleted += report.orphaned_events_deleted;

        // Baselines survive every retention pass; report the count as proof.
        report.baselines_preserved = self.store.count_baselines().await?;

        info!(
            dry_run = options.dry_run,
            sources = report.sources_processed,
            events_deleted = report.total_events_deleted,
            orphaned = report.orphaned_events_deleted,
            baselines_preserved = report.baselines_preserved,
            "Retention cleanup completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_whole_days_before_reference() {
        let reference = Utc.with_ymd_and_hms(2024, 6, 10, 8, 30, 0).unwrap();

        assert_eq!(
            cutoff(30, reference),
            Utc.with_ymd_and_hms(2024, 5, 11, 8, 30, 0).unwrap()
        );
        assert_eq!(
            cutoff(180, reference),
            reference - Duration::days(180)
        );
    }

    #[test]
    fn cutoff_is_strictly_before_reference_even_for_degenerate_input() {
        let reference = Utc.with_ymd_and_hms(2024, 6, 10, 8, 30, 0).unwrap();
        assert!(cutoff(0, reference) < reference);
        assert!(cutoff(-7, reference) < reference);
    }
}
