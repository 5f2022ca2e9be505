//! Test support utilities for regcopy-core
//!
//! Provides MockRegistry, an in-memory registry, and manifest builders for
//! testing transfers and orchestration without a real registry.

use async_trait::async_trait;
use regcopy_registry::{
    Manifest, Registry, RegistryError, Result, DOCKER_MANIFEST_V2, OCI_INDEX_V1,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Tags { repository: String },
    GetManifest { repository: String, reference: String },
    PutManifest { repository: String, reference: String },
    HasBlob { repository: String, digest: String },
    GetBlob { repository: String, digest: String },
    PutBlob { repository: String, digest: String },
}

/// In-memory registry for testing
pub struct MockRegistry {
    host: String,
    calls: Mutex<Vec<MockCall>>,
    /// Tags per repository, in insertion order
    tags: Mutex<HashMap<String, Vec<String>>>,
    manifests: Mutex<HashMap<(String, String), Manifest>>,
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
    /// References whose manifest push fails
    failing_pushes: Mutex<HashSet<String>>,
    /// Fail tag listing with this status
    tags_error: Mutex<Option<u16>>,
}

impl MockRegistry {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            calls: Mutex::new(Vec::new()),
            tags: Mutex::new(HashMap::new()),
            manifests: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            failing_pushes: Mutex::new(HashSet::new()),
            tags_error: Mutex::new(None),
        }
    }

    /// Add a manifest under a tag, listing the tag
    pub fn add_image(&self, repository: &str, tag: &str, manifest: Manifest) {
        self.add_manifest(repository, tag, manifest);
        let mut tags = self.tags.lock().unwrap();
        let tags = tags.entry(repository.to_string()).or_default();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    /// Add a manifest without listing it as a tag
    pub fn add_manifest(&self, repository: &str, reference: &str, manifest: Manifest) {
        self.manifests
            .lock()
            .unwrap()
            .insert((repository.to_string(), reference.to_string()), manifest);
    }

    pub fn add_blob(&self, repository: &str, digest: &str, data: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert((repository.to_string(), digest.to_string()), data.to_vec());
    }

    /// Make pushing a manifest under `reference` fail
    pub fn fail_push(&self, reference: &str) {
        self.failing_pushes
            .lock()
            .unwrap()
            .insert(reference.to_string());
    }

    /// Make tag listing fail with an HTTP status
    pub fn fail_tags(&self, status: u16) {
        *self.tags_error.lock().unwrap() = Some(status);
    }

    pub fn manifest(&self, repository: &str, reference: &str) -> Option<Manifest> {
        self.manifests
            .lock()
            .unwrap()
            .get(&(repository.to_string(), reference.to_string()))
            .cloned()
    }

    pub fn blob(&self, repository: &str, digest: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(repository.to_string(), digest.to_string()))
            .cloned()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a specific call was made
    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }
}

#[async_trait]
impl Registry for MockRegistry {
    fn host(&self) -> &str {
        &self.host
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        self.record(MockCall::Tags {
            repository: repository.to_string(),
        });
        if let Some(status) = *self.tags_error.lock().unwrap() {
            return Err(RegistryError::Status {
                method: "GET".to_string(),
                url: format!("mock://{}/v2/{}/tags/list", self.host, repository),
                status,
            });
        }
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_manifest(&self, repository: &str, reference: &str) -> Result<Manifest> {
        self.record(MockCall::GetManifest {
            repository: repository.to_string(),
            reference: reference.to_string(),
        });
        self.manifest(repository, reference).ok_or_else(|| {
            RegistryError::ManifestNotFound(format!("{}/{}:{}", self.host, repository, reference))
        })
    }

    async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<()> {
        self.record(MockCall::PutManifest {
            repository: repository.to_string(),
            reference: reference.to_string(),
        });
        if self.failing_pushes.lock().unwrap().contains(reference) {
            return Err(RegistryError::Status {
                method: "PUT".to_string(),
                url: format!("mock://{}/v2/{}/manifests/{}", self.host, repository, reference),
                status: 500,
            });
        }
        if reference.contains(':') {
            self.add_manifest(repository, reference, manifest.clone());
        } else {
            self.add_image(repository, reference, manifest.clone());
        }
        Ok(())
    }

    async fn has_blob(&self, repository: &str, digest: &str) -> Result<bool> {
        self.record(MockCall::HasBlob {
            repository: repository.to_string(),
            digest: digest.to_string(),
        });
        Ok(self.blob(repository, digest).is_some())
    }

    async fn get_blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>> {
        self.record(MockCall::GetBlob {
            repository: repository.to_string(),
            digest: digest.to_string(),
        });
        self.blob(repository, digest).ok_or_else(|| {
            RegistryError::BlobNotFound(format!("{}/{}@{}", self.host, repository, digest))
        })
    }

    async fn put_blob(&self, repository: &str, digest: &str, data: Vec<u8>) -> Result<()> {
        self.record(MockCall::PutBlob {
            repository: repository.to_string(),
            digest: digest.to_string(),
        });
        self.add_blob(repository, digest, &data);
        Ok(())
    }
}

/// Build a Docker schema 2 image manifest
pub fn image_manifest(config: &str, layers: &[&str]) -> Manifest {
    let layers: Vec<_> = layers
        .iter()
        .map(|digest| {
            serde_json::json!({
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": 1,
                "digest": digest,
            })
        })
        .collect();
    let content = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": DOCKER_MANIFEST_V2,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": 1,
            "digest": config,
        },
        "layers": layers,
    });
    Manifest::new(Some(DOCKER_MANIFEST_V2), content.to_string().into_bytes())
}

/// Build an OCI image index over the given manifest digests
pub fn index_manifest(manifests: &[&str]) -> Manifest {
    let manifests: Vec<_> = manifests
        .iter()
        .map(|digest| {
            serde_json::json!({
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "size": 1,
                "digest": digest,
            })
        })
        .collect();
    let content = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": OCI_INDEX_V1,
        "manifests": manifests,
    });
    Manifest::new(Some(OCI_INDEX_V1), content.to_string().into_bytes())
}
