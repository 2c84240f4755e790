use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("invalid workspace spec: {0}")]
    InvalidSpec(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
