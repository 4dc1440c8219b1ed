use thiserror::Error;

use crate::domain::models::DemandId;

/// Errors that can occur while working with demands.
#[derive(Debug, Error)]
pub enum DemandError {
    #[error("demand not found: {0}")]
    NotFound(DemandId),
    #[error("invalid input: {0}")]
    Validation(String),
    /// The in-memory demand is still the source of truth; the caller may retry.
    #[error("storage failure for {}: {message}", id.as_deref().unwrap_or("demand index"))]
    Storage { id: Option<String>, message: String },
    #[error("session expired after {ttl_minutes} minutes, reset the session to continue")]
    SessionExpired { ttl_minutes: i64 },
}

impl DemandError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(id: Option<&DemandId>, msg: impl Into<String>) -> Self {
        Self::Storage {
            id: id.map(|id| id.to_string()),
            message: msg.into(),
        }
    }

    /// Whether the user can recover by creating a new demand or resetting the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::SessionExpired { .. })
    }
}
