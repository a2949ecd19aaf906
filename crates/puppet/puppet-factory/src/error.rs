//! Error types for startup, loading and model construction.

use puppet_core::{ManifestError, ModelError, NativeError, PayloadError};
use thiserror::Error;

/// Runtime startup gave up. `Clone` so every waiter on the shared future receives it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeStartupError {
    #[error("runtime {runtime} failed to start after {attempts} attempts: {last}")]
    Exhausted {
        runtime: String,
        attempts: u32,
        last: NativeError,
    },
}

/// A resource could not be fetched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to load {url}: {message}")]
pub struct LoadError {
    pub url: String,
    pub message: String,
}

impl LoadError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("no registered runtime accepts this model source")]
    UnsupportedFormat,
    #[error(transparent)]
    Startup(#[from] RuntimeStartupError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Native(#[from] NativeError),
    #[error("failed to load {url}: {message}")]
    Load { url: String, message: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<LoadError> for FactoryError {
    fn from(err: LoadError) -> Self {
        FactoryError::Load {
            url: err.url,
            message: err.message,
        }
    }
}
