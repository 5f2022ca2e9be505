//! Error types for registry access

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Authentication with {registry} failed: {reason}")]
    Auth { registry: String, reason: String },

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid CA certificate {path}: {reason}")]
    InvalidCertificate { path: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
