//! Error types for configuration loading and editing.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while reading, validating, or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("document parse error: {0}")]
    Document(#[from] toml_edit::TomlError),

    #[error("missing key [{section}].{key}")]
    MissingKey { section: String, key: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
