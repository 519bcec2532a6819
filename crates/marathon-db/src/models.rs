//! Database row types. These map directly to SQLite rows and are converted
//! into `marathon-types` models at the query boundary.

use chrono::{DateTime, Utc};
use marathon_types::{
    Activity, ActivityName, LedgerError, LedgerResult, PostEvent, RotationHour, User, UserId,
};

pub struct UserRow {
    pub user_id: i64,
    pub rotation_hour: i64,
    pub notification_target: Option<String>,
    pub last_rotation_at: Option<i64>,
    pub last_post_at: Option<i64>,
    pub last_activity_at: Option<i64>,
    pub created_at: i64,
}

pub struct ActivityRow {
    pub user_id: i64,
    pub name: String,
    pub total: i64,
    pub current: i64,
    pub last_post_at: Option<i64>,
    pub last_notified_at: Option<i64>,
}

pub struct PostRow {
    pub user_id: i64,
    pub activity: String,
    pub posted_at: i64,
}

/// Timestamps are stored as Unix milliseconds.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(ms: i64) -> LedgerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LedgerError::Fatal(format!("stored timestamp {} out of range", ms)))
}

fn from_millis_opt(ms: Option<i64>) -> LedgerResult<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

fn counter(value: i64, column: &str) -> LedgerResult<u64> {
    u64::try_from(value)
        .map_err(|_| LedgerError::Fatal(format!("negative {} counter: {}", column, value)))
}

fn stored_name(name: String) -> LedgerResult<ActivityName> {
    ActivityName::new(name).map_err(|e| LedgerError::Fatal(format!("stored activity name: {}", e)))
}

impl TryFrom<UserRow> for User {
    type Error = LedgerError;

    fn try_from(row: UserRow) -> LedgerResult<Self> {
        let hour = u8::try_from(row.rotation_hour)
            .ok()
            .and_then(|h| RotationHour::new(h).ok())
            .ok_or_else(|| {
                LedgerError::Fatal(format!("stored rotation hour {} invalid", row.rotation_hour))
            })?;

        Ok(User {
            user_id: UserId(row.user_id),
            rotation_hour: hour,
            notification_target: row.notification_target,
            last_rotation_at: from_millis_opt(row.last_rotation_at)?,
            last_post_at: from_millis_opt(row.last_post_at)?,
            last_activity_at: from_millis_opt(row.last_activity_at)?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

impl TryFrom<ActivityRow> for Activity {
    type Error = LedgerError;

    fn try_from(row: ActivityRow) -> LedgerResult<Self> {
        Ok(Activity {
            user_id: UserId(row.user_id),
            name: stored_name(row.name)?,
            total: counter(row.total, "total")?,
            current: counter(row.current, "current")?,
            last_post_at: from_millis_opt(row.last_post_at)?,
            last_notified_at: from_millis_opt(row.last_notified_at)?,
        })
    }
}

impl TryFrom<PostRow> for PostEvent {
    type Error = LedgerError;

    fn try_from(row: PostRow) -> LedgerResult<Self> {
        Ok(PostEvent {
            user_id: UserId(row.user_id),
            activity: stored_name(row.activity)?,
            posted_at: from_millis(row.posted_at)?,
        })
    }
}
