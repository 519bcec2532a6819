use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Longest activity name accepted, in characters.
pub const MAX_ACTIVITY_NAME_CHARS: usize = 64;

// -- Identifiers --

/// Stable user identifier assigned by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// UTC hour of day (0..=23) at which a user's counters roll over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RotationHour(u8);

impl RotationHour {
    pub const MIDNIGHT: RotationHour = RotationHour(0);

    pub fn new(hour: u8) -> Result<Self, LedgerError> {
        if hour > 23 {
            return Err(LedgerError::validation(
                "rotation_hour",
                format!("{} is outside 0..=23", hour),
            ));
        }
        Ok(Self(hour))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RotationHour {
    type Error = LedgerError;

    fn try_from(hour: u8) -> Result<Self, Self::Error> {
        Self::new(hour)
    }
}

impl From<RotationHour> for u8 {
    fn from(hour: RotationHour) -> u8 {
        hour.0
    }
}

impl fmt::Display for RotationHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00 UTC", self.0)
    }
}

/// Activity name, unique per user. Stored exactly as supplied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActivityName(String);

impl ActivityName {
    pub fn new(name: impl Into<String>) -> Result<Self, LedgerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::validation("activity", "name must not be blank"));
        }
        if name.chars().count() > MAX_ACTIVITY_NAME_CHARS {
            return Err(LedgerError::validation(
                "activity",
                format!("name is longer than {} characters", MAX_ACTIVITY_NAME_CHARS),
            ));
        }
        if name.chars().any(char::is_control) {
            return Err(LedgerError::validation(
                "activity",
                "name must not contain control characters",
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActivityName {
    type Error = LedgerError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<ActivityName> for String {
    fn from(name: ActivityName) -> String {
        name.0
    }
}

impl AsRef<str> for ActivityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject a supplied but blank notification target. `None` means "keep the
/// stored one" and passes through.
pub fn check_notification_target(target: Option<String>) -> Result<Option<String>, LedgerError> {
    match target {
        Some(t) if t.trim().is_empty() => Err(LedgerError::validation(
            "notification_target",
            "must not be blank",
        )),
        other => Ok(other),
    }
}

// -- Rows --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub rotation_hour: RotationHour,
    /// Where reminders go (e.g. the chat the user registered from).
    pub notification_target: Option<String>,
    pub last_rotation_at: Option<DateTime<Utc>>,
    pub last_post_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub user_id: UserId,
    pub name: ActivityName,
    pub total: u64,
    pub current: u64,
    pub last_post_at: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
}

/// Counters of one activity as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub current: u64,
    pub last_post_at: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl From<&Activity> for Stats {
    fn from(activity: &Activity) -> Self {
        Self {
            total: activity.total,
            current: activity.current,
            last_post_at: activity.last_post_at,
            last_notified_at: activity.last_notified_at,
        }
    }
}

/// One row of the append-only posts log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEvent {
    pub user_id: UserId,
    pub activity: ActivityName,
    pub posted_at: DateTime<Utc>,
}

/// Result of an idempotent registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    Created,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_hour_bounds() {
        assert_eq!(RotationHour::new(0).unwrap().get(), 0);
        assert_eq!(RotationHour::new(23).unwrap().get(), 23);
        assert!(RotationHour::new(24).unwrap_err().is_validation());
    }

    #[test]
    fn rotation_hour_rejected_during_deserialization() {
        let ok: RotationHour = serde_json::from_str("5").unwrap();
        assert_eq!(ok.get(), 5);
        assert!(serde_json::from_str::<RotationHour>("42").is_err());
    }

    #[test]
    fn activity_name_keeps_caller_format() {
        let name = ActivityName::new("Morning Run").unwrap();
        assert_eq!(name.as_str(), "Morning Run");
    }

    #[test]
    fn activity_name_rejects_blank_and_oversized() {
        assert!(ActivityName::new("   ").is_err());
        assert!(ActivityName::new("").is_err());
        assert!(ActivityName::new("a".repeat(MAX_ACTIVITY_NAME_CHARS + 1)).is_err());
        assert!(ActivityName::new("a".repeat(MAX_ACTIVITY_NAME_CHARS)).is_ok());
        assert!(ActivityName::new("run\n").is_err());
    }

    #[test]
    fn blank_notification_target_is_rejected() {
        assert!(check_notification_target(Some("  ".into())).unwrap_err().is_validation());
        assert_eq!(check_notification_target(None).unwrap(), None);
        assert_eq!(
            check_notification_target(Some("chat-1".into())).unwrap().as_deref(),
            Some("chat-1")
        );
    }
}
