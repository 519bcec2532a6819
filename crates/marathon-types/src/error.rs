use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::UserId;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// The row an operation expected to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    User(UserId),
    Activity { user_id: UserId, name: String },
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::User(id) => write!(f, "user {} not found", id),
            Missing::Activity { user_id, name } => {
                write!(f, "activity {:?} not found for user {}", name, user_id)
            }
        }
    }
}

/// Errors returned by registry and ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{0}")]
    NotFound(Missing),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Busy/locked store. Retried by the retry wrapper before surfacing.
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("storage failure: {0}")]
    Fatal(String),

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
}

impl LedgerError {
    pub fn user_not_found(user_id: UserId) -> Self {
        Self::NotFound(Missing::User(user_id))
    }

    pub fn activity_not_found(user_id: UserId, name: impl Into<String>) -> Self {
        Self::NotFound(Missing::Activity {
            user_id,
            name: name.into(),
        })
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation { .. } => ErrorKind::Invalid,
            Self::Transient(_) | Self::DeadlineExceeded(_) => ErrorKind::TryLater,
            Self::Fatal(_) => ErrorKind::Internal,
        }
    }
}

/// Coarse error class the presentation layer renders from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Data not found or user not registered yet.
    NotFound,
    Conflict,
    Invalid,
    /// Store unavailable right now; the same request may succeed later.
    TryLater,
    Internal,
}

/// Wire form of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&LedgerError> for ErrorBody {
    fn from(err: &LedgerError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
