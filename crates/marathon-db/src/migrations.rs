use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 2;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, activities)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                user_id             INTEGER PRIMARY KEY,
                rotation_hour       INTEGER NOT NULL DEFAULT 0
                                    CHECK (rotation_hour BETWEEN 0 AND 23),
                notification_target TEXT,
                last_rotation_at    INTEGER,
                last_post_at        INTEGER,
                last_activity_at    INTEGER,
                created_at          INTEGER NOT NULL
            );

            CREATE INDEX idx_users_rotation
                ON users(rotation_hour, last_rotation_at);

            CREATE TABLE activities (
                user_id          INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                name             TEXT NOT NULL,
                total            INTEGER NOT NULL DEFAULT 0 CHECK (total >= 0),
                current          INTEGER NOT NULL DEFAULT 0 CHECK (current >= 0),
                last_post_at     INTEGER,
                last_notified_at INTEGER,
                PRIMARY KEY (user_id, name)
            );

            CREATE INDEX idx_activities_stalled
                ON activities(current, last_notified_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (posts log)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE posts (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id   INTEGER NOT NULL,
                activity  TEXT NOT NULL,
                posted_at INTEGER NOT NULL
            );

            CREATE INDEX idx_posts_activity
                ON posts(user_id, activity, posted_at);

            INSERT INTO schema_version (version) VALUES (2);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete (schema v{})", SCHEMA_VERSION);
    Ok(())
}
