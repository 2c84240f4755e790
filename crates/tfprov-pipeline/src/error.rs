use std::time::Duration;

use thiserror::Error;
use tfprov_core::{CoreError, RunPhase};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{0} already exists")]
    Conflict(String),

    #[error("not available yet: {0}")]
    TransientUnavailable(String),

    #[error("run {run_id} failed during {phase} with status '{status}'")]
    RunFailed {
        run_id: String,
        phase: RunPhase,
        status: String,
    },

    #[error("configuration version {id} failed ingestion with status '{status}'")]
    ConfigurationFailed { id: String, status: String },

    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("unexpected remote error: {0}")]
    UnexpectedRemote(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProvisionError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        ProvisionError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether a polling loop may absorb this error and try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::TransientUnavailable(_))
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(e: reqwest::Error) -> Self {
        ProvisionError::UnexpectedRemote(format!("HTTP request failed: {e}"))
    }
}

impl From<CoreError> for ProvisionError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::TemplateNotFound(path) => ProvisionError::not_found("template", path),
            CoreError::InvalidSpec(msg) => ProvisionError::Config(msg),
            CoreError::IoError(e) => ProvisionError::Io(e),
            CoreError::SerializationError(e) => ProvisionError::Serialization(e),
        }
    }
}
