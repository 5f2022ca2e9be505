//! Docker credentials configuration
//!
//! Located at `~/.docker/config.json` unless `DOCKER_CONFIG` points elsewhere.

use crate::{ConfigError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Subset of the Docker config.json that drives credential resolution
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DockerAuthConfig {
    /// Default credential helper (e.g. "desktop", "secretservice", "osxkeychain")
    pub creds_store: Option<String>,
    /// Per-registry credential helpers
    pub cred_helpers: HashMap<String, String>,
    /// Inline base64-encoded credentials
    pub auths: HashMap<String, AuthEntry>,
}

/// An entry in the "auths" section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthEntry {
    /// Base64-encoded "username:password"
    pub auth: Option<String>,
}

impl DockerAuthConfig {
    /// Load the config from a specific path.
    ///
    /// A missing file is not an error: it simply means there are no
    /// config-derived credentials.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::debug!("Docker config not found at {:?}, skipping", path);
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::from_json(&content).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            "Loaded docker config from {:?}: creds_store={:?}, {} cred helpers, {} auths",
            path,
            config.creds_store,
            config.cred_helpers.len(),
            config.auths.len()
        );

        Ok(Some(config))
    }

    /// Parse a config document
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Default config path, respecting `DOCKER_CONFIG`
    pub fn default_path() -> Result<PathBuf> {
        let docker_config = std::env::var_os("DOCKER_CONFIG").map(PathBuf::from);
        config_path(docker_config.as_deref(), dirs::home_dir)
    }
}

/// The home directory is only consulted when `docker_config` is unset
fn config_path(
    docker_config: Option<&Path>,
    home_dir: impl FnOnce() -> Option<PathBuf>,
) -> Result<PathBuf> {
    match docker_config {
        Some(dir) => Ok(dir.join("config.json")),
        None => {
            let home = home_dir().ok_or(ConfigError::NoHomeDir)?;
            Ok(home.join(".docker/config.json"))
        }
    }
}
