//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
  /// Config file could not be read
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Config file is not valid TOML
  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  /// Merged layers do not form a valid configuration
  #[error("invalid configuration: {0}")]
  Invalid(#[from] toml::de::Error),

  /// Built-in defaults could not be encoded as a layer
  #[error("failed to encode defaults: {0}")]
  Encode(#[from] toml::ser::Error),

  /// Malformed `-c key=value` override
  #[error("invalid override `{0}`: expected KEY=VALUE")]
  InvalidOverride(String),
}

/// Alias for Result<T, ConfigError>
pub type Result<T> = std::result::Result<T, ConfigError>;
