use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use marathon_types::clock::truncate_to_hour;
use marathon_types::error::{ErrorBody, ErrorKind};
use marathon_types::events::{BatchKind, BatchReport, Outcome, Reminder};
use marathon_types::{ActivityLedger, LedgerResult, UserId, UserRegistry};
use tracing::{debug, info};

use crate::batch::{DEFAULT_CONCURRENCY, for_each_user};
use crate::notifier::Notifier;

/// Default minimum spacing between two reminders for the same activity.
pub const DEFAULT_FREEZE_WINDOW_HOURS: i64 = 15;

/// Finds users with stalled activities and hands reminders to a [`Notifier`].
///
/// An activity is stamped as notified only after delivery succeeded, so a
/// failed delivery is retried on the next run.
pub struct NotificationEvaluator {
    registry: Arc<dyn UserRegistry>,
    ledger: Arc<dyn ActivityLedger>,
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
}

impl NotificationEvaluator {
    pub fn new(
        registry: Arc<dyn UserRegistry>,
        ledger: Arc<dyn ActivityLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            ledger,
            notifier,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn users_to_notify(
        &self,
        now: DateTime<Utc>,
        freeze_window: Duration,
    ) -> LedgerResult<Vec<UserId>> {
        self.ledger.users_to_notify(now, freeze_window).await
    }

    pub async fn run_batch(
        &self,
        now: DateTime<Utc>,
        freeze_window: Duration,
    ) -> LedgerResult<BatchReport> {
        let ids = self.users_to_notify(now, freeze_window).await?;
        let eligible = ids.len();

        let registry = self.registry.clone();
        let ledger = self.ledger.clone();
        let notifier = self.notifier.clone();
        let outcomes = for_each_user("notification", ids, self.concurrency, move |user_id| {
            remind(
                registry.clone(),
                ledger.clone(),
                notifier.clone(),
                user_id,
                now,
                freeze_window,
            )
        })
        .await;

        let report = BatchReport {
            kind: BatchKind::Notification,
            bucket: truncate_to_hour(now),
            outcomes,
        };
        info!(
            eligible,
            notified = report.succeeded(),
            failed = report.failed(),
            "Notification batch complete"
        );
        Ok(report)
    }
}

async fn remind(
    registry: Arc<dyn UserRegistry>,
    ledger: Arc<dyn ActivityLedger>,
    notifier: Arc<dyn Notifier>,
    user_id: UserId,
    now: DateTime<Utc>,
    freeze_window: Duration,
) -> Outcome {
    let stalled = match ledger.stalled_activities(user_id, now, freeze_window).await {
        Ok(stalled) => stalled,
        Err(e) => return Outcome::from_error(&e),
    };
    if stalled.is_empty() {
        return Outcome::Skipped {
            reason: "no stalled activities".into(),
        };
    }

    let user = match registry.user(user_id).await {
        Ok(user) => user,
        Err(e) => return Outcome::from_error(&e),
    };

    let reminder = Reminder {
        user_id,
        notification_target: user.notification_target,
        activities: stalled.iter().map(|n| n.as_str().to_string()).collect(),
        at: now,
    };

    if let Err(e) = notifier.notify(&reminder).await {
        return Outcome::Failed {
            error: ErrorBody {
                kind: ErrorKind::TryLater,
                message: format!("delivery failed: {:#}", e),
            },
        };
    }

    match ledger.mark_notified(user_id, &stalled, now).await {
        Ok(stamped) => {
            debug!(user_id = %user_id, stamped, "reminder delivered");
            Outcome::Ok
        }
        Err(e) => Outcome::from_error(&e),
    }
}
