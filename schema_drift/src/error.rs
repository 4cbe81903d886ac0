//! Error types for schema_drift

use thiserror::Error;

/// Result type for schema_drift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for schema_drift
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Snapshot failure: {0}")]
    SnapshotFailure(String),

    #[error("Diff failure: {0}")]
    DiffFailure(String),

    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Reference schema provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Model registration error: {0}")]
    ModelRegistrationError(String),

    #[error("Type mapping error: {0}")]
    TypeMappingError(String),

    #[error("Syntax error: {0}")]
    SyntaxError(String),
}

impl Error {
    /// Wrap a driver error raised while introspecting a live schema
    pub(crate) fn snapshot(error: sqlx::Error) -> Self {
        Error::SnapshotFailure(error.to_string())
    }

    /// Wrap a driver error raised while obtaining a connection
    pub(crate) fn connection(error: sqlx::Error) -> Self {
        Error::ConnectionFailure(error.to_string())
    }
}

/// Convert Serde JSON errors to schema_drift errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationFailure(error.to_string())
    }
}

/// Convert Serde YAML errors to schema_drift errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationFailure(error.to_string())
    }
}

/// Convert TOML deserialization errors to schema_drift errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
