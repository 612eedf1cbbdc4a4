use serde::Serialize;

use crate::model::{ActivityType, ModuleId};

/// All errors the progression engine and its boundaries can produce.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted data exists but does not parse or validate.
    #[error("Stored progress is corrupted: {0}")]
    StorageCorruption(String),

    /// Network failure or non-success response from the remote service.
    #[error("Remote progress service unavailable: {0}")]
    RemoteUnavailable(String),

    /// A module or activity action was requested out of order.
    #[error("{} is locked: {reason}", lock_target(.module, .activity))]
    SequenceViolation {
        module: ModuleId,
        activity: Option<ActivityType>,
        reason: String,
    },

    /// A mutation would have left the document in an invalid state.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown module id: {0}")]
    UnknownModule(String),

    #[error("Unknown activity type: {0}")]
    UnknownActivity(String),

    #[error("{0}")]
    Custom(String),
}

fn lock_target(module: &ModuleId, activity: &Option<ActivityType>) -> String {
    match activity {
        Some(activity) => format!("{module} {activity}"),
        None => module.to_string(),
    }
}

impl ProgressError {
    /// True for the one error class a UI collaborator is expected to act on.
    pub fn is_sequence_violation(&self) -> bool {
        matches!(self, ProgressError::SequenceViolation { .. })
    }
}

impl From<reqwest::Error> for ProgressError {
    fn from(e: reqwest::Error) -> Self {
        ProgressError::RemoteUnavailable(e.to_string())
    }
}

// Webview collaborators receive errors as plain strings.
impl Serialize for ProgressError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProgressError>;
