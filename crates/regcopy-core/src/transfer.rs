//! Manifest and blob transfer between registries

use crate::{RegistryImage, Result};
use futures::future::{BoxFuture, FutureExt};
use regcopy_registry::{Manifest, Registry};

/// One side of a transfer: a registry and a repository in it
#[derive(Clone, Copy)]
struct Endpoint<'a> {
    registry: &'a dyn Registry,
    repository: &'a str,
}

/// Copy the image at `src`'s reference to `dst`'s reference.
///
/// Blobs already present in the destination are skipped. For multi-platform
/// images every platform manifest is copied by digest before the index is
/// pushed, so the destination never references missing content.
pub async fn copy_image(src: &RegistryImage, dst: &RegistryImage) -> Result<()> {
    let from = Endpoint {
        registry: src.registry(),
        repository: src.repository(),
    };
    let to = Endpoint {
        registry: dst.registry(),
        repository: dst.repository(),
    };

    let manifest = src.manifest().await?;
    copy_referenced(from, to, &manifest).await?;
    to.registry
        .put_manifest(to.repository, dst.reference(), &manifest)
        .await?;

    tracing::debug!("Copied {} to {}", src, dst);
    Ok(())
}

/// Copy everything `manifest` refers to, recursing into indexes
fn copy_referenced<'a>(
    from: Endpoint<'a>,
    to: Endpoint<'a>,
    manifest: &'a Manifest,
) -> BoxFuture<'a, Result<()>> {
    async move {
        if manifest.is_index() {
            for digest in manifest.child_manifests()? {
                let child = from.registry.get_manifest(from.repository, &digest).await?;
                copy_referenced(from, to, &child).await?;
                to.registry
                    .put_manifest(to.repository, &digest, &child)
                    .await?;
            }
        } else {
            for digest in manifest.blobs()? {
                copy_blob(from, to, &digest).await?;
            }
        }
        Ok(())
    }
    .boxed()
}

async fn copy_blob(from: Endpoint<'_>, to: Endpoint<'_>, digest: &str) -> Result<()> {
    if to.registry.has_blob(to.repository, digest).await? {
        tracing::debug!("Blob {} already exists in {}/{}", digest, to.registry.host(), to.repository);
        return Ok(());
    }

    let data = from.registry.get_blob(from.repository, digest).await?;
    tracing::debug!(
        "Copying blob {} ({} bytes) to {}/{}",
        digest,
        data.len(),
        to.registry.host(),
        to.repository
    );
    to.registry.put_blob(to.repository, digest, data).await?;
    Ok(())
}
