use std::sync::Arc;

use chrono::{DateTime, Utc};
use marathon_types::clock::{hour_bucket, truncate_to_hour};
use marathon_types::events::{BatchKind, BatchReport, Outcome};
use marathon_types::{ActivityLedger, LedgerResult, UserRegistry};
use tracing::info;

use crate::batch::{DEFAULT_CONCURRENCY, for_each_user};

/// Daily rollover of every user whose rotation hour has come.
///
/// Stateless between runs: which users are due is derived entirely from the
/// stored `last_rotation_at`, so a trigger firing twice in one hour is
/// harmless.
pub struct RotationEngine {
    registry: Arc<dyn UserRegistry>,
    ledger: Arc<dyn ActivityLedger>,
    concurrency: usize,
}

impl RotationEngine {
    pub fn new(registry: Arc<dyn UserRegistry>, ledger: Arc<dyn ActivityLedger>) -> Self {
        Self {
            registry,
            ledger,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Rotate the cohort of `now`'s hour bucket. Fails only when the cohort
    /// itself cannot be selected; per-user failures are reported in the
    /// returned outcomes.
    pub async fn run_batch(&self, now: DateTime<Utc>) -> LedgerResult<BatchReport> {
        let hour = hour_bucket(now);
        let ids = self.registry.users_due_for_rotation(hour, now).await?;
        let cohort = ids.len();

        let ledger = self.ledger.clone();
        let outcomes = for_each_user("rotation", ids, self.concurrency, move |user_id| {
            let ledger = ledger.clone();
            async move {
                match ledger.rotate(user_id, now).await {
                    Ok(()) => Outcome::Ok,
                    Err(e) => Outcome::from_error(&e),
                }
            }
        })
        .await;

        let report = BatchReport {
            kind: BatchKind::Rotation,
            bucket: truncate_to_hour(now),
            outcomes,
        };
        info!(
            hour = hour.get(),
            cohort,
            rotated = report.succeeded(),
            failed = report.failed(),
            "Rotation batch complete"
        );
        Ok(report)
    }
}
