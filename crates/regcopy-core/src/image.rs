//! Image references and registry-bound image handles

use crate::{copy_image, CoreError, Result};
use regcopy_auth::{Credential, CredentialStore, DictCredentialStore};
use regcopy_registry::{HttpRegistry, HttpRegistryOptions, Manifest, Registry};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Registry assumed when an image name has no registry component
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag assumed when an image name has neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

/// A parsed image reference: registry host, repository and tag or digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    /// Tag (`v1.2`) or digest (`sha256:...`)
    pub reference: String,
}

impl ImageRef {
    /// Parse an image reference.
    ///
    /// Examples:
    ///   "nginx" -> docker.io/library/nginx:latest
    ///   "ghcr.io/org/app:v1" -> ghcr.io/org/app:v1
    ///   "localhost:5000/app@sha256:abc" -> localhost:5000/app@sha256:abc
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason: &str| CoreError::InvalidReference {
            reference: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (name, digest) = match input.split_once('@') {
            Some((name, digest)) => {
                if !is_valid_digest(digest) {
                    return Err(invalid("digest must look like <algorithm>:<hex>"));
                }
                (name, Some(digest))
            }
            None => (input, None),
        };

        // First component is a registry if it looks like a host
        let (registry, remainder) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first, rest)
            }
            _ => (DEFAULT_REGISTRY, name),
        };
        let registry = if registry == "index.docker.io" {
            DEFAULT_REGISTRY
        } else {
            registry
        };

        // A colon after the last slash separates the tag
        let last_slash = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => (
                &remainder[..last_slash + i],
                Some(&remainder[last_slash + i + 1..]),
            ),
            None => (remainder, None),
        };

        if !is_valid_repository(repository) {
            return Err(invalid(
                "repository must be lowercase alphanumeric components separated by '/'",
            ));
        }
        if let Some(tag) = tag {
            if !is_valid_tag(tag) {
                return Err(invalid("invalid tag"));
            }
        }

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository.to_string()
        };

        let reference = match (digest, tag) {
            (Some(digest), _) => digest.to_string(),
            (None, Some(tag)) => tag.to_string(),
            (None, None) => DEFAULT_TAG.to_string(),
        };

        Ok(Self {
            registry: registry.to_string(),
            repository,
            reference,
        })
    }

    /// True if the reference is a digest rather than a tag
    pub fn is_digest(&self) -> bool {
        self.reference.contains(':')
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.is_digest() { '@' } else { ':' };
        write!(
            f,
            "{}/{}{}{}",
            self.registry, self.repository, separator, self.reference
        )
    }
}

impl std::str::FromStr for ImageRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn is_valid_repository(repository: &str) -> bool {
    !repository.is_empty()
        && repository.split('/').all(|component| {
            !component.is_empty()
                && component
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
                && component
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric())
        })
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c))
        && !tag.starts_with(['.', '-'])
}

fn is_valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty()
                && !hex.is_empty()
                && algorithm
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// An image in a specific registry.
///
/// The repository coordinates are fixed; the reference can be moved between
/// tags, which is how multi-tag runs walk a repository.
#[derive(Clone)]
pub struct RegistryImage {
    registry: Arc<dyn Registry>,
    image: ImageRef,
}

impl RegistryImage {
    pub fn new(registry: Arc<dyn Registry>, image: ImageRef) -> Self {
        Self { registry, image }
    }

    /// Parse `reference` and connect to its registry over HTTP.
    ///
    /// A literal `user` credential takes precedence over `store`; with
    /// neither, requests are anonymous.
    pub fn connect(
        reference: &str,
        user: Option<Credential>,
        ca_certificate: Option<PathBuf>,
        store: Option<Arc<dyn CredentialStore>>,
    ) -> Result<Self> {
        let image = ImageRef::parse(reference)?;

        let credentials: Arc<dyn CredentialStore> = match (user, store) {
            (Some(cred), _) => Arc::new(DictCredentialStore::single(image.registry.clone(), cred)),
            (None, Some(store)) => store,
            (None, None) => Arc::new(DictCredentialStore::default()),
        };

        let options = HttpRegistryOptions { ca_certificate };
        let registry = HttpRegistry::new(&image.registry, credentials, &options)?;

        Ok(Self::new(Arc::new(registry), image))
    }

    pub fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    pub fn repository(&self) -> &str {
        &self.image.repository
    }

    pub fn reference(&self) -> &str {
        &self.image.reference
    }

    /// Point this image at another tag or digest
    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.image.reference = reference.into();
    }

    /// Tags of the repository, in registry order
    pub async fn tags(&self) -> Result<Vec<String>> {
        Ok(self.registry.tags(&self.image.repository).await?)
    }

    /// Manifest at the current reference
    pub async fn manifest(&self) -> Result<Manifest> {
        Ok(self
            .registry
            .get_manifest(&self.image.repository, &self.image.reference)
            .await?)
    }

    /// Copy the image at the current reference to `dst`'s current reference
    pub async fn copy_to(&self, dst: &RegistryImage) -> Result<()> {
        copy_image(self, dst).await
    }
}

impl fmt::Display for RegistryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.image.fmt(f)
    }
}

impl fmt::Debug for RegistryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryImage")
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> ImageRef {
        ImageRef::parse(s).unwrap()
    }

    #[test]
    fn test_parse_docker_hub_defaults() {
        let image = parse("nginx");
        assert_eq!(image.registry, "docker.io");
        assert_eq!(image.repository, "library/nginx");
        assert_eq!(image.reference, "latest");

        let image = parse("bitnami/redis:7.2");
        assert_eq!(image.registry, "docker.io");
        assert_eq!(image.repository, "bitnami/redis");
        assert_eq!(image.reference, "7.2");

        assert_eq!(parse("index.docker.io/library/alpine").registry, "docker.io");
    }

    #[test]
    fn test_parse_registry_host() {
        let image = parse("ghcr.io/org/team/app:v1.0-rc");
        assert_eq!(image.registry, "ghcr.io");
        assert_eq!(image.repository, "org/team/app");
        assert_eq!(image.reference, "v1.0-rc");

        let image = parse("localhost:5000/app");
        assert_eq!(image.registry, "localhost:5000");
        assert_eq!(image.repository, "app");
        assert_eq!(image.reference, "latest");

        let image = parse("localhost/app:dev");
        assert_eq!(image.registry, "localhost");
        assert_eq!(image.reference, "dev");
    }

    #[test]
    fn test_parse_digest() {
        let image = parse("registry.example.com:5000/app:v1@sha256:0123abcd");
        assert_eq!(image.registry, "registry.example.com:5000");
        assert_eq!(image.repository, "app");
        assert_eq!(image.reference, "sha256:0123abcd");
        assert!(image.is_digest());
    }

    #[test]
    fn test_parse_invalid() {
        for input in [
            "",
            "   ",
            "Upper/Case",
            "ghcr.io/",
            "ghcr.io//app",
            "app:",
            "app@sha256",
            "app@sha256:xyz",
            "app:-leading",
        ] {
            assert!(
                matches!(ImageRef::parse(input), Err(CoreError::InvalidReference { .. })),
                "expected {:?} to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(parse("nginx").to_string(), "docker.io/library/nginx:latest");
        assert_eq!(
            parse("ghcr.io/org/app@sha256:abc").to_string(),
            "ghcr.io/org/app@sha256:abc"
        );
    }

    #[test]
    fn test_from_str() {
        let image: ImageRef = "quay.io/org/app:v2".parse().unwrap();
        assert_eq!(image.reference, "v2");
    }

    #[test]
    fn test_set_reference() {
        let registry = Arc::new(crate::test_support::MockRegistry::new("registry.example.com"));
        let mut image = RegistryImage::new(registry, parse("registry.example.com/app:v1"));
        image.set_reference("v2");
        assert_eq!(image.reference(), "v2");
        assert_eq!(image.to_string(), "registry.example.com/app:v2");
    }

    #[test]
    fn test_connect_with_user_override() {
        let image = RegistryImage::connect(
            "registry.example.com/app:v1",
            Some(Credential::new("alice", "secret")),
            None,
            None,
        )
        .unwrap();
        assert_eq!(image.registry().host(), "registry.example.com");
        assert_eq!(image.repository(), "app");
    }

    #[test]
    fn test_connect_invalid_reference() {
        let result = RegistryImage::connect("Not Valid", None, None, None);
        assert!(matches!(result, Err(CoreError::InvalidReference { .. })));
    }
}
