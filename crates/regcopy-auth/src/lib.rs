//! Registry credential stores for regcopy
//!
//! A [`CredentialStore`] answers one question: "which credentials should be
//! used for this registry host?". Two stores are provided:
//! - [`DictCredentialStore`]: a fixed in-memory mapping
//! - [`DockerCredentialStore`]: Docker config `auths` plus credential helpers

mod dict;
mod docker;
mod error;
mod helper;

pub use dict::DictCredentialStore;
pub use docker::{normalize_host, DockerCredentialStore, DOCKER_HUB_INDEX};
pub use error::*;
pub use helper::{HelperRunner, ProcessHelperRunner};

use async_trait::async_trait;
use std::fmt;

/// Username signalling that the secret is an identity token
pub const IDENTITY_TOKEN_USER: &str = "<token>";

/// Username/secret pair for a registry
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// True if the secret is an identity (refresh) token rather than a password
    pub fn is_identity_token(&self) -> bool {
        self.username == IDENTITY_TOKEN_USER
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of registry credentials.
///
/// Absence is a normal result: implementations return `None` for hosts they
/// cannot resolve and never fail.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get the credentials for a registry host, if any
    async fn get(&self, host: &str) -> Option<Credential>;
}

/// Parse a literal `user:password` override.
///
/// An empty string means "no override". The password may itself contain
/// colons; only the first one separates the fields.
pub fn parse_user(value: &str) -> Result<Option<Credential>> {
    if value.is_empty() {
        return Ok(None);
    }

    match value.split_once(':') {
        Some((user, password)) if !user.is_empty() => Ok(Some(Credential::new(user, password))),
        _ => Err(AuthError::InvalidUser(value.split(':').next().unwrap_or_default().to_string())),
    }
}
