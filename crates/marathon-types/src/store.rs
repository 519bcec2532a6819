//! Storage capability traits.
//!
//! The rotation engine, the reminder evaluator and the command service only
//! ever see these traits; concrete backends (SQLite in `marathon-db`, test
//! doubles in tests) implement them. Every method that writes a timestamp
//! takes it as an argument so callers decide what "now" is.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::LedgerResult;
use crate::models::{ActivityName, PostEvent, Registration, RotationHour, Stats, User, UserId};

/// Owner of user rows.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    /// Create the user with `default_hour`, or update `notification_target`
    /// of an existing user. Never touches the rotation hour or activities of
    /// an existing user.
    async fn register(
        &self,
        user_id: UserId,
        notification_target: Option<String>,
        default_hour: RotationHour,
        at: DateTime<Utc>,
    ) -> LedgerResult<Registration>;

    /// Remove the user together with all of its activities.
    async fn deregister(&self, user_id: UserId) -> LedgerResult<()>;

    async fn set_rotation_hour(
        &self,
        user_id: UserId,
        hour: RotationHour,
        at: DateTime<Utc>,
    ) -> LedgerResult<()>;

    async fn user(&self, user_id: UserId) -> LedgerResult<User>;

    /// Users whose rotation hour is `hour` and who have not rotated since
    /// `clock::rotation_cutoff(now)`.
    async fn users_due_for_rotation(
        &self,
        hour: RotationHour,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<UserId>>;

    async fn users_without_activities(&self) -> LedgerResult<Vec<UserId>>;
}

/// Sole mutator of activity rows.
#[async_trait]
pub trait ActivityLedger: Send + Sync {
    async fn create_activity(
        &self,
        user_id: UserId,
        name: &ActivityName,
        at: DateTime<Utc>,
    ) -> LedgerResult<()>;

    async fn delete_activity(
        &self,
        user_id: UserId,
        name: &ActivityName,
        at: DateTime<Utc>,
    ) -> LedgerResult<()>;

    /// `current += 1`, stamp the user's `last_post_at` and append a post event.
    async fn post_activity(
        &self,
        user_id: UserId,
        name: &ActivityName,
        at: DateTime<Utc>,
    ) -> LedgerResult<()>;

    async fn stats(&self, user_id: UserId, name: &ActivityName) -> LedgerResult<Stats>;

    /// Activity names of the user in lexicographic order.
    async fn list_activities(&self, user_id: UserId) -> LedgerResult<Vec<ActivityName>>;

    /// Bank or reset every activity of the user and stamp `last_rotation_at`,
    /// all in one transaction.
    async fn rotate(&self, user_id: UserId, at: DateTime<Utc>) -> LedgerResult<()>;

    /// Users owning at least one stalled activity outside the freeze window.
    async fn users_to_notify(
        &self,
        now: DateTime<Utc>,
        freeze_window: Duration,
    ) -> LedgerResult<Vec<UserId>>;

    /// The stalled activities of one user that are outside the freeze window.
    async fn stalled_activities(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        freeze_window: Duration,
    ) -> LedgerResult<Vec<ActivityName>>;

    /// Stamp `last_notified_at = at` on the named activities. Returns how many
    /// rows were stamped; names that no longer exist are skipped.
    async fn mark_notified(
        &self,
        user_id: UserId,
        names: &[ActivityName],
        at: DateTime<Utc>,
    ) -> LedgerResult<usize>;

    /// Most recent entries of the posts log for one activity, newest first.
    async fn post_history(
        &self,
        user_id: UserId,
        name: &ActivityName,
        limit: u32,
    ) -> LedgerResult<Vec<PostEvent>>;
}
