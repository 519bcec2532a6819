//! Statement-level operations. Every function here runs inside a
//! transaction opened by [`crate::Database`]; none of them commit.

use chrono::{DateTime, Utc};
use marathon_types::{
    Activity, ActivityName, LedgerError, LedgerResult, PostEvent, Registration, RotationHour,
    User, UserId,
};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::error::SqlResultExt;
use crate::models::{ActivityRow, PostRow, UserRow, to_millis};

// -- Users --

fn user_exists(conn: &Connection, user_id: UserId) -> LedgerResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)",
        [user_id.0],
        |row| row.get(0),
    )
    .into_ledger()
}

fn require_user(conn: &Connection, user_id: UserId) -> LedgerResult<()> {
    if user_exists(conn, user_id)? {
        Ok(())
    } else {
        Err(LedgerError::user_not_found(user_id))
    }
}

fn touch_user(conn: &Connection, user_id: UserId, at: DateTime<Utc>) -> LedgerResult<()> {
    conn.execute(
        "UPDATE users SET last_activity_at = ?2 WHERE user_id = ?1",
        params![user_id.0, to_millis(at)],
    )
    .into_ledger()?;
    Ok(())
}

/// Insert-or-update. A re-registration without a target keeps the old one.
pub(crate) fn upsert_user(
    conn: &Connection,
    user_id: UserId,
    notification_target: Option<&str>,
    default_hour: RotationHour,
    at: DateTime<Utc>,
) -> LedgerResult<Registration> {
    let existed = user_exists(conn, user_id)?;

    conn.execute(
        "INSERT INTO users (user_id, rotation_hour, notification_target, created_at, last_activity_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             notification_target = COALESCE(excluded.notification_target, users.notification_target),
             last_activity_at = excluded.last_activity_at",
        params![user_id.0, default_hour.get(), notification_target, to_millis(at)],
    )
    .into_ledger()?;

    Ok(if existed {
        Registration::Updated
    } else {
        Registration::Created
    })
}

pub(crate) fn delete_user(conn: &Connection, user_id: UserId) -> LedgerResult<()> {
    require_user(conn, user_id)?;

    let activities = conn
        .execute("DELETE FROM activities WHERE user_id = ?1", [user_id.0])
        .into_ledger()?;
    conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id.0])
        .into_ledger()?;

    debug!(user_id = %user_id, activities, "user deleted");
    Ok(())
}

pub(crate) fn set_rotation_hour(
    conn: &Connection,
    user_id: UserId,
    hour: RotationHour,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    let changed = conn
        .execute(
            "UPDATE users SET rotation_hour = ?2, last_activity_at = ?3 WHERE user_id = ?1",
            params![user_id.0, hour.get(), to_millis(at)],
        )
        .into_ledger()?;

    if changed == 0 {
        return Err(LedgerError::user_not_found(user_id));
    }
    Ok(())
}

pub(crate) fn get_user(conn: &Connection, user_id: UserId) -> LedgerResult<User> {
    let row = conn
        .query_row(
            "SELECT user_id, rotation_hour, notification_target, last_rotation_at,
                    last_post_at, last_activity_at, created_at
             FROM users WHERE user_id = ?1",
            [user_id.0],
            |row| {
                Ok(UserRow {
                    user_id: row.get(0)?,
                    rotation_hour: row.get(1)?,
                    notification_target: row.get(2)?,
                    last_rotation_at: row.get(3)?,
                    last_post_at: row.get(4)?,
                    last_activity_at: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?
        .ok_or(LedgerError::user_not_found(user_id))?;

    User::try_from(row)
}

/// Users in `hour` whose last rotation is before `cutoff` (or who never rotated).
pub(crate) fn users_due_for_rotation(
    conn: &Connection,
    hour: RotationHour,
    cutoff: DateTime<Utc>,
) -> LedgerResult<Vec<UserId>> {
    collect_user_ids(
        conn,
        "SELECT user_id FROM users
         WHERE rotation_hour = ?1
           AND (last_rotation_at IS NULL OR last_rotation_at < ?2)
         ORDER BY user_id",
        params![hour.get(), to_millis(cutoff)],
    )
}

pub(crate) fn users_without_activities(conn: &Connection) -> LedgerResult<Vec<UserId>> {
    collect_user_ids(
        conn,
        "SELECT u.user_id FROM users u
         WHERE NOT EXISTS (SELECT 1 FROM activities a WHERE a.user_id = u.user_id)
         ORDER BY u.user_id",
        params![],
    )
}

fn collect_user_ids(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> LedgerResult<Vec<UserId>> {
    let mut stmt = conn.prepare(sql).into_ledger()?;
    let ids = stmt
        .query_map(params, |row| row.get::<_, i64>(0))
        .into_ledger()?
        .map(|r| r.map(UserId))
        .collect::<Result<Vec<_>, _>>()
        .into_ledger()?;
    Ok(ids)
}

// -- Activities --

pub(crate) fn insert_activity(
    conn: &Connection,
    user_id: UserId,
    name: &ActivityName,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    require_user(conn, user_id)?;

    conn.execute(
        "INSERT INTO activities (user_id, name, total, current) VALUES (?1, ?2, 0, 0)",
        params![user_id.0, name.as_str()],
    )
    .map_err(|e| match crate::error::classify(e) {
        LedgerError::Conflict(_) => LedgerError::Conflict(format!(
            "activity {:?} already exists for user {}",
            name.as_str(),
            user_id
        )),
        other => other,
    })?;

    touch_user(conn, user_id, at)
}

pub(crate) fn delete_activity(
    conn: &Connection,
    user_id: UserId,
    name: &ActivityName,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    require_user(conn, user_id)?;

    let deleted = conn
        .execute(
            "DELETE FROM activities WHERE user_id = ?1 AND name = ?2",
            params![user_id.0, name.as_str()],
        )
        .into_ledger()?;
    if deleted == 0 {
        return Err(LedgerError::activity_not_found(user_id, name.as_str()));
    }

    touch_user(conn, user_id, at)
}

/// Increment in SQL so concurrent posts never overwrite each other.
pub(crate) fn post_activity(
    conn: &Connection,
    user_id: UserId,
    name: &ActivityName,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    require_user(conn, user_id)?;
    let at_ms = to_millis(at);

    let updated = conn
        .execute(
            "UPDATE activities SET current = current + 1, last_post_at = ?3
             WHERE user_id = ?1 AND name = ?2",
            params![user_id.0, name.as_str(), at_ms],
        )
        .into_ledger()?;
    if updated == 0 {
        return Err(LedgerError::activity_not_found(user_id, name.as_str()));
    }

    conn.execute(
        "UPDATE users SET last_post_at = ?2, last_activity_at = ?2 WHERE user_id = ?1",
        params![user_id.0, at_ms],
    )
    .into_ledger()?;

    conn.execute(
        "INSERT INTO posts (user_id, activity, posted_at) VALUES (?1, ?2, ?3)",
        params![user_id.0, name.as_str(), at_ms],
    )
    .into_ledger()?;

    Ok(())
}

pub(crate) fn get_activity(
    conn: &Connection,
    user_id: UserId,
    name: &ActivityName,
) -> LedgerResult<Activity> {
    require_user(conn, user_id)?;

    let row = conn
        .query_row(
            "SELECT user_id, name, total, current, last_post_at, last_notified_at
             FROM activities WHERE user_id = ?1 AND name = ?2",
            params![user_id.0, name.as_str()],
            |row| {
                Ok(ActivityRow {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    total: row.get(2)?,
                    current: row.get(3)?,
                    last_post_at: row.get(4)?,
                    last_notified_at: row.get(5)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| LedgerError::activity_not_found(user_id, name.as_str()))?;

    Activity::try_from(row)
}

pub(crate) fn list_activity_names(
    conn: &Connection,
    user_id: UserId,
) -> LedgerResult<Vec<ActivityName>> {
    require_user(conn, user_id)?;
    collect_names(
        conn,
        "SELECT name FROM activities WHERE user_id = ?1 ORDER BY name",
        params![user_id.0],
    )
}

fn collect_names(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> LedgerResult<Vec<ActivityName>> {
    let mut stmt = conn.prepare(sql).into_ledger()?;
    let names = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .into_ledger()?
        .collect::<Result<Vec<_>, _>>()
        .into_ledger()?;

    names
        .into_iter()
        .map(|n| {
            ActivityName::new(n)
                .map_err(|e| LedgerError::Fatal(format!("stored activity name: {}", e)))
        })
        .collect()
}

// -- Rotation --

/// Counts of what one rotation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RotationSummary {
    pub reset: usize,
    pub banked: usize,
}

/// Reset stalled activities, bank the rest, stamp the user. Order matters:
/// banking first would zero `current` and the reset would then catch
/// every activity.
pub(crate) fn rotate_user(
    conn: &Connection,
    user_id: UserId,
    at: DateTime<Utc>,
) -> LedgerResult<RotationSummary> {
    require_user(conn, user_id)?;

    let reset = conn
        .execute(
            "UPDATE activities SET total = 0 WHERE user_id = ?1 AND current = 0",
            [user_id.0],
        )
        .into_ledger()?;

    let banked = conn
        .execute(
            "UPDATE activities SET total = total + current, current = 0
             WHERE user_id = ?1 AND current > 0",
            [user_id.0],
        )
        .into_ledger()?;

    conn.execute(
        "UPDATE users SET last_rotation_at = ?2 WHERE user_id = ?1",
        params![user_id.0, to_millis(at)],
    )
    .into_ledger()?;

    Ok(RotationSummary { reset, banked })
}

// -- Reminders --

pub(crate) fn users_to_notify(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> LedgerResult<Vec<UserId>> {
    collect_user_ids(
        conn,
        "SELECT DISTINCT user_id FROM activities
         WHERE current = 0
           AND (last_notified_at IS NULL OR last_notified_at < ?1)
         ORDER BY user_id",
        params![to_millis(cutoff)],
    )
}

pub(crate) fn stalled_activities(
    conn: &Connection,
    user_id: UserId,
    cutoff: DateTime<Utc>,
) -> LedgerResult<Vec<ActivityName>> {
    require_user(conn, user_id)?;
    collect_names(
        conn,
        "SELECT name FROM activities
         WHERE user_id = ?1
           AND current = 0
           AND (last_notified_at IS NULL OR last_notified_at < ?2)
         ORDER BY name",
        params![user_id.0, to_millis(cutoff)],
    )
}

pub(crate) fn mark_notified(
    conn: &Connection,
    user_id: UserId,
    names: &[ActivityName],
    at: DateTime<Utc>,
) -> LedgerResult<usize> {
    require_user(conn, user_id)?;

    let mut stmt = conn
        .prepare("UPDATE activities SET last_notified_at = ?3 WHERE user_id = ?1 AND name = ?2")
        .into_ledger()?;

    let mut stamped = 0;
    for name in names {
        stamped += stmt
            .execute(params![user_id.0, name.as_str(), to_millis(at)])
            .into_ledger()?;
    }
    Ok(stamped)
}

// -- Posts log --

pub(crate) fn post_history(
    conn: &Connection,
    user_id: UserId,
    name: &ActivityName,
    limit: u32,
) -> LedgerResult<Vec<PostEvent>> {
    // also checks that the user and the activity exist
    get_activity(conn, user_id, name)?;

    let mut stmt = conn
        .prepare(
            "SELECT user_id, activity, posted_at FROM posts
             WHERE user_id = ?1 AND activity = ?2
             ORDER BY posted_at DESC, id DESC
             LIMIT ?3",
        )
        .into_ledger()?;

    let rows = stmt
        .query_map(params![user_id.0, name.as_str(), limit], |row| {
            Ok(PostRow {
                user_id: row.get(0)?,
                activity: row.get(1)?,
                posted_at: row.get(2)?,
            })
        })
        .into_ledger()?
        .collect::<Result<Vec<_>, _>>()
        .into_ledger()?;

    rows.into_iter().map(PostEvent::try_from).collect()
}
