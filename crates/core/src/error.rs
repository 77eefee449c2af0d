//! Shared error type for the certwatch crates.

use thiserror::Error;

/// Top-level error enum used across the workspace.
#[derive(Debug, Error)]
pub enum CertwatchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("website not found: {0}")]
    WebsiteNotFound(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("{0}")]
    Other(String),
}

impl CertwatchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CertwatchError>;
