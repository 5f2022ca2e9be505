//! Registry access for regcopy
//!
//! This crate provides the [`Registry`] trait, an abstraction over the
//! subset of the Docker Registry HTTP API v2 needed to list tags and move
//! manifests and blobs between registries, and [`HttpRegistry`], its
//! reqwest-based implementation.

mod challenge;
mod error;
mod http;
mod manifest;

pub use error::*;
pub use http::{HttpRegistry, HttpRegistryOptions};
pub use manifest::*;

use async_trait::async_trait;

/// Operations regcopy needs from a container registry.
///
/// Repository names are registry-relative (e.g. `library/nginx`).
/// References are tags or `sha256:` digests.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registry host this client talks to, as written in image references
    fn host(&self) -> &str;

    /// List the repository's tags in the order the registry reports them
    async fn tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Fetch a manifest by tag or digest
    async fn get_manifest(&self, repository: &str, reference: &str) -> Result<Manifest>;

    /// Push a manifest under a tag or digest
    async fn put_manifest(&self, repository: &str, reference: &str, manifest: &Manifest)
        -> Result<()>;

    /// Check whether a blob exists in the repository
    async fn has_blob(&self, repository: &str, digest: &str) -> Result<bool>;

    /// Download a blob
    async fn get_blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>>;

    /// Upload a blob
    async fn put_blob(&self, repository: &str, digest: &str, data: Vec<u8>) -> Result<()>;
}
