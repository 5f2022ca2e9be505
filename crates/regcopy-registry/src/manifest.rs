//! Manifest documents

use crate::{RegistryError, Result};
use serde_json::Value;

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_MANIFEST_V1_SIGNED: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// Media types requested when fetching manifests
pub const MANIFEST_ACCEPT: &[&str] = &[
    OCI_INDEX_V1,
    OCI_MANIFEST_V1,
    DOCKER_MANIFEST_LIST_V2,
    DOCKER_MANIFEST_V2,
    DOCKER_MANIFEST_V1_SIGNED,
];

/// A manifest exactly as served by the registry.
///
/// The raw bytes are kept so the manifest can be pushed unchanged and keep
/// its digest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl Manifest {
    /// Wrap raw manifest bytes.
    ///
    /// An empty or generic media type is replaced by the document's own
    /// `mediaType` field when present.
    pub fn new(media_type: Option<&str>, data: Vec<u8>) -> Self {
        let declared = media_type
            .map(|m| m.split(';').next().unwrap_or(m).trim())
            .filter(|m| !m.is_empty() && *m != "application/json");

        let media_type = match declared {
            Some(m) => m.to_string(),
            None => serde_json::from_slice::<Value>(&data)
                .ok()
                .and_then(|v| v.get("mediaType").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| DOCKER_MANIFEST_V2.to_string()),
        };

        Self { media_type, data }
    }

    /// Parsed JSON content
    pub fn content(&self) -> Result<Value> {
        serde_json::from_slice(&self.data)
            .map_err(|e| RegistryError::InvalidManifest(format!("not valid JSON: {}", e)))
    }

    /// True for manifest lists and OCI indexes
    pub fn is_index(&self) -> bool {
        self.media_type == OCI_INDEX_V1 || self.media_type == DOCKER_MANIFEST_LIST_V2
    }

    /// Digests of the manifests an index refers to
    pub fn child_manifests(&self) -> Result<Vec<String>> {
        let content = self.content()?;
        let Some(manifests) = content.get("manifests").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        manifests
            .iter()
            .map(|m| descriptor_digest(m, "manifests"))
            .collect()
    }

    /// Digests of the blobs an image manifest refers to, config first,
    /// without duplicates
    pub fn blobs(&self) -> Result<Vec<String>> {
        let content = self.content()?;
        let mut digests = Vec::new();

        if let Some(config) = content.get("config") {
            digests.push(descriptor_digest(config, "config")?);
        }
        if let Some(layers) = content.get("layers").and_then(Value::as_array) {
            for layer in layers {
                digests.push(descriptor_digest(layer, "layers")?);
            }
        }
        // Schema 1 manifests list layers as fsLayers[].blobSum
        if let Some(layers) = content.get("fsLayers").and_then(Value::as_array) {
            for layer in layers {
                let digest = layer
                    .get("blobSum")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RegistryError::InvalidManifest("fsLayers entry without blobSum".into()))?;
                digests.push(digest.to_string());
            }
        }

        let mut seen = std::collections::HashSet::new();
        digests.retain(|d| seen.insert(d.clone()));
        Ok(digests)
    }
}

fn descriptor_digest(descriptor: &Value, field: &str) -> Result<String> {
    descriptor
        .get("digest")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RegistryError::InvalidManifest(format!("{} entry without digest", field)))
}
