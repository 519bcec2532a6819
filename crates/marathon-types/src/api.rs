use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Registration, Stats, UserId};

// -- Commands --

/// One user-issued command, as decoded by the presentation layer.
///
/// Names and hours arrive unvalidated; the command service checks them
/// before any storage access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    Register {
        user_id: UserId,
        #[serde(default)]
        notification_target: Option<String>,
    },

    Deregister { user_id: UserId },

    CreateActivity { user_id: UserId, name: String },

    DeleteActivity { user_id: UserId, name: String },

    PostActivity { user_id: UserId, name: String },

    ListActivities { user_id: UserId },

    GetStats { user_id: UserId, name: String },

    SetRotationHour { user_id: UserId, hour: u8 },

    /// Rotate this user's counters immediately instead of waiting for the
    /// scheduled hour.
    RotateNow { user_id: UserId },

    PostHistory {
        user_id: UserId,
        name: String,
        #[serde(default = "default_history_limit")]
        limit: u32,
    },
}

fn default_history_limit() -> u32 {
    20
}

impl Command {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::Register { user_id, .. }
            | Self::Deregister { user_id }
            | Self::CreateActivity { user_id, .. }
            | Self::DeleteActivity { user_id, .. }
            | Self::PostActivity { user_id, .. }
            | Self::ListActivities { user_id }
            | Self::GetStats { user_id, .. }
            | Self::SetRotationHour { user_id, .. }
            | Self::RotateNow { user_id }
            | Self::PostHistory { user_id, .. } => *user_id,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Deregister { .. } => "deregister",
            Self::CreateActivity { .. } => "create_activity",
            Self::DeleteActivity { .. } => "delete_activity",
            Self::PostActivity { .. } => "post_activity",
            Self::ListActivities { .. } => "list_activities",
            Self::GetStats { .. } => "get_stats",
            Self::SetRotationHour { .. } => "set_rotation_hour",
            Self::RotateNow { .. } => "rotate_now",
            Self::PostHistory { .. } => "post_history",
        }
    }
}

/// Structured success payload for a [`Command`]. Rendering is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CommandReply {
    Registered { registration: Registration },
    Deregistered,
    ActivityCreated { name: String },
    ActivityDeleted { name: String },
    Posted { name: String },
    Activities { names: Vec<String> },
    Stats { name: String, stats: Stats },
    RotationHourSet { hour: u8 },
    Rotated,
    History { name: String, posted_at: Vec<DateTime<Utc>> },
}
