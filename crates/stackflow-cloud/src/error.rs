//! Cloud layer error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the state store and secret sources
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Secret resolution failed: {0}")]
    SecretError(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Why a provider call failed in a way that may succeed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientReason {
    /// A referenced resource exists but the control plane does not see it yet
    NotYetVisible,
    /// Rate limited by the control plane
    Throttled,
}

impl std::fmt::Display for TransientReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransientReason::NotYetVisible => write!(f, "not yet visible"),
            TransientReason::Throttled => write!(f, "throttled"),
        }
    }
}

/// Error returned by a [`ResourceProvider`](crate::ResourceProvider) operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transient provider error ({reason}): {message}")]
    Transient {
        reason: TransientReason,
        message: String,
    },

    #[error("permanent provider error: {message}")]
    Permanent { message: String },
}

impl ProviderError {
    pub fn not_yet_visible(message: impl Into<String>) -> Self {
        Self::Transient {
            reason: TransientReason::NotYetVisible,
            message: message.into(),
        }
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Transient {
            reason: TransientReason::Throttled,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Transient reason, if any
    pub fn transient_reason(&self) -> Option<TransientReason> {
        match self {
            Self::Transient { reason, .. } => Some(*reason),
            Self::Permanent { .. } => None,
        }
    }
}
