use thiserror::Error;

/// Errors raised by Warden domain code and its collaborator adapters.
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WardenError>;
