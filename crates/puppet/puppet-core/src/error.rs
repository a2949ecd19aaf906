//! Error types shared across the pipeline.

use thiserror::Error;

/// Malformed or structurally invalid model manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    Invalid(String),
    #[error("manifest json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Malformed motion, expression, physics or pose payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed {kind} payload: {message}")]
    Malformed { kind: &'static str, message: String },
}

impl PayloadError {
    pub fn malformed(kind: &'static str, message: impl Into<String>) -> Self {
        PayloadError::Malformed {
            kind,
            message: message.into(),
        }
    }
}

/// Failure reported by a native engine object.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("native error: {message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by [`crate::InternalModel`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("model has been destroyed")]
    Destroyed,
    #[error(transparent)]
    Native(#[from] NativeError),
}

impl From<ManifestError> for ModelError {
    fn from(err: ManifestError) -> Self {
        ModelError::Validation(err.to_string())
    }
}
