//! Error types for the hosts container.

use std::io;

use thiserror::Error;

use crate::container::ContainerError;
use crate::watch::WatchError;

/// Main error type for hosts container operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("hosts container error: {0}")]
    Container(#[from] ContainerError),

    #[error("file watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("hosts_paths[{index}] cannot be empty")]
    EmptyHostsPath { index: usize },

    #[error("root cannot be empty")]
    EmptyRoot,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
