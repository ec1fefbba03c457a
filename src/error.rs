//! Error types for AntaraNav

use thiserror::Error;

/// AntaraNav error type
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Malformed scan: {0}")]
    MalformedScan(String),

    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for PlannerError {
    fn from(e: toml::de::Error) -> Self {
        PlannerError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
