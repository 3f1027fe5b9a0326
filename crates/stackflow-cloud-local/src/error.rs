//! Sandbox provider error types

use stackflow_cloud::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Kind mismatch for {identity}: recorded {recorded}, requested {requested}")]
    KindMismatch {
        identity: String,
        recorded: String,
        requested: String,
    },

    #[error("Invalid desired state for {kind}: {reason}")]
    InvalidDesiredState { kind: String, reason: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

impl From<SandboxError> for ProviderError {
    fn from(err: SandboxError) -> Self {
        ProviderError::permanent(err.to_string())
    }
}
