use thiserror::Error;

/// Top-level error type for the Peopole system.
///
/// Subsystem crates define their own error types where they need richer
/// detail and convert into `PeopoleError` at crate boundaries so that the
/// `?` operator works across them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PeopoleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Push error: {0}")]
    Push(String),
}

impl From<toml::de::Error> for PeopoleError {
    fn from(err: toml::de::Error) -> Self {
        PeopoleError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PeopoleError {
    fn from(err: toml::ser::Error) -> Self {
        PeopoleError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PeopoleError {
    fn from(err: serde_json::Error) -> Self {
        PeopoleError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Peopole operations.
pub type Result<T> = std::result::Result<T, PeopoleError>;
