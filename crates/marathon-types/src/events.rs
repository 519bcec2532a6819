use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorBody, LedgerError};
use crate::models::UserId;

/// Which scheduled batch produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Rotation,
    Notification,
}

/// Per-user result inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    /// Nothing to do for this user (e.g. every stalled activity was
    /// notified concurrently).
    Skipped { reason: String },
    Failed { error: ErrorBody },
}

impl Outcome {
    pub fn from_error(err: &LedgerError) -> Self {
        Outcome::Failed { error: err.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOutcome {
    pub user_id: UserId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl UserOutcome {
    pub fn ok(user_id: UserId) -> Self {
        Self {
            user_id,
            outcome: Outcome::Ok,
        }
    }

    pub fn skipped(user_id: UserId, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(user_id: UserId, err: &LedgerError) -> Self {
        Self {
            user_id,
            outcome: Outcome::from_error(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

/// Everything one scheduled trigger did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub kind: BatchKind,
    /// Hour-aligned instant the batch was evaluated against.
    pub bucket: DateTime<Utc>,
    pub outcomes: Vec<UserOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn outcome_for(&self, user_id: UserId) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.user_id == user_id)
            .map(|o| &o.outcome)
    }
}

/// A stall reminder handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub user_id: UserId,
    pub notification_target: Option<String>,
    pub activities: Vec<String>,
    pub at: DateTime<Utc>,
}
