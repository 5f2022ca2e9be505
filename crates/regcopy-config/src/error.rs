//! Error types for configuration parsing

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse JSON config at {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to determine home directory")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
