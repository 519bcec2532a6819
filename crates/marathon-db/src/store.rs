use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use marathon_types::clock::{notification_cutoff, rotation_cutoff};
use marathon_types::models::check_notification_target;
use marathon_types::{
    ActivityLedger, ActivityName, LedgerError, LedgerResult, PostEvent, Registration,
    RotationHour, Stats, User, UserId, UserRegistry,
};
use rusqlite::Connection;
use tracing::{debug, error};

use crate::Database;
use crate::queries;
use crate::retry::{self, RetryPolicy};

/// SQLite implementation of both storage capabilities.
///
/// Each call is one transaction, executed on the blocking pool and wrapped in
/// the retry policy. A retry re-runs the whole transaction body.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    policy: RetryPolicy,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    async fn write<T, F>(&self, op: &'static str, f: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> LedgerResult<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        retry::run(&self.policy, op, |deadline| {
            let db = self.db.clone();
            let f = f.clone();
            async move {
                tokio::task::spawn_blocking(move || db.write(op, deadline, &*f))
                    .await
                    .map_err(|e| join_error(op, e))?
            }
        })
        .await
    }

    async fn read<T, F>(&self, op: &'static str, f: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> LedgerResult<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        retry::run(&self.policy, op, |deadline| {
            let db = self.db.clone();
            let f = f.clone();
            async move {
                tokio::task::spawn_blocking(move || db.read(op, deadline, &*f))
                    .await
                    .map_err(|e| join_error(op, e))?
            }
        })
        .await
    }
}

fn join_error(op: &'static str, e: tokio::task::JoinError) -> LedgerError {
    error!(op, "spawn_blocking join error: {}", e);
    LedgerError::Fatal(format!("{} worker failed: {}", op, e))
}

#[async_trait]
impl UserRegistry for SqliteStore {
    async fn register(
        &self,
        user_id: UserId,
        notification_target: Option<String>,
        default_hour: RotationHour,
        at: DateTime<Utc>,
    ) -> LedgerResult<Registration> {
        let notification_target = check_notification_target(notification_target)?;

        let registration = self
            .write("register", move |conn| {
                queries::upsert_user(conn, user_id, notification_target.as_deref(), default_hour, at)
            })
            .await?;
        debug!(user_id = %user_id, ?registration, "user registered");
        Ok(registration)
    }

    async fn deregister(&self, user_id: UserId) -> LedgerResult<()> {
        self.write("deregister", move |conn| queries::delete_user(conn, user_id))
            .await
    }

    async fn set_rotation_hour(
        &self,
        user_id: UserId,
        hour: RotationHour,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        self.write("set_rotation_hour", move |conn| {
            queries::set_rotation_hour(conn, user_id, hour, at)
        })
        .await
    }

    async fn user(&self, user_id: UserId) -> LedgerResult<User> {
        self.read("user", move |conn| queries::get_user(conn, user_id))
            .await
    }

    async fn users_due_for_rotation(
        &self,
        hour: RotationHour,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<UserId>> {
        let cutoff = rotation_cutoff(now);
        self.read("users_due_for_rotation", move |conn| {
            queries::users_due_for_rotation(conn, hour, cutoff)
        })
        .await
    }

    async fn users_without_activities(&self) -> LedgerResult<Vec<UserId>> {
        self.read("users_without_activities", queries::users_without_activities)
            .await
    }
}

#[async_trait]
impl ActivityLedger for SqliteStore {
    async fn create_activity(
        &self,
        user_id: UserId,
        name: &ActivityName,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let name = name.clone();
        self.write("create_activity", move |conn| {
            queries::insert_activity(conn, user_id, &name, at)
        })
        .await
    }

    async fn delete_activity(
        &self,
        user_id: UserId,
        name: &ActivityName,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let name = name.clone();
        self.write("delete_activity", move |conn| {
            queries::delete_activity(conn, user_id, &name, at)
        })
        .await
    }

    async fn post_activity(
        &self,
        user_id: UserId,
        name: &ActivityName,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let name = name.clone();
        self.write("post_activity", move |conn| {
            queries::post_activity(conn, user_id, &name, at)
        })
        .await
    }

    async fn stats(&self, user_id: UserId, name: &ActivityName) -> LedgerResult<Stats> {
        let name = name.clone();
        let activity = self
            .read("stats", move |conn| queries::get_activity(conn, user_id, &name))
            .await?;
        Ok(Stats::from(&activity))
    }

    async fn list_activities(&self, user_id: UserId) -> LedgerResult<Vec<ActivityName>> {
        self.read("list_activities", move |conn| {
            queries::list_activity_names(conn, user_id)
        })
        .await
    }

    async fn rotate(&self, user_id: UserId, at: DateTime<Utc>) -> LedgerResult<()> {
        let summary = self
            .write("rotate", move |conn| queries::rotate_user(conn, user_id, at))
            .await?;
        debug!(
            user_id = %user_id,
            reset = summary.reset,
            banked = summary.banked,
            "user rotated"
        );
        Ok(())
    }

    async fn users_to_notify(
        &self,
        now: DateTime<Utc>,
        freeze_window: Duration,
    ) -> LedgerResult<Vec<UserId>> {
        let cutoff = notification_cutoff(now, freeze_window);
        self.read("users_to_notify", move |conn| {
            queries::users_to_notify(conn, cutoff)
        })
        .await
    }

    async fn stalled_activities(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        freeze_window: Duration,
    ) -> LedgerResult<Vec<ActivityName>> {
        let cutoff = notification_cutoff(now, freeze_window);
        self.read("stalled_activities", move |conn| {
            queries::stalled_activities(conn, user_id, cutoff)
        })
        .await
    }

    async fn mark_notified(
        &self,
        user_id: UserId,
        names: &[ActivityName],
        at: DateTime<Utc>,
    ) -> LedgerResult<usize> {
        let names = names.to_vec();
        self.write("mark_notified", move |conn| {
            queries::mark_notified(conn, user_id, &names, at)
        })
        .await
    }

    async fn post_history(
        &self,
        user_id: UserId,
        name: &ActivityName,
        limit: u32,
    ) -> LedgerResult<Vec<PostEvent>> {
        let name = name.clone();
        self.read("post_history", move |conn| {
            queries::post_history(conn, user_id, &name, limit)
        })
        .await
    }
}
