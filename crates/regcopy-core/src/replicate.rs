//! Inspect and copy orchestration
//!
//! A run either inspects the source (no destination) or copies it to a
//! destination. With a tag filter, the run walks every matching tag of the
//! source repository in registry order, one tag at a time.

use crate::{CoreError, RegistryImage, Result, TagFilter};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Manifests fetched by an inspect run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManifestOutput {
    /// Content of the manifest at the source reference
    Single(Value),
    /// Tag → manifest content, in registry tag order
    Tagged(Map<String, Value>),
}

/// Tags copied by a copy run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: Vec<String>,
}

/// Result of [`ReplicationJob::run`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Inspected(ManifestOutput),
    Copied(CopyReport),
}

/// A complete inspect or copy run
pub struct ReplicationJob {
    pub source: RegistryImage,
    pub destination: Option<RegistryImage>,
    pub filter: Option<TagFilter>,
}

impl ReplicationJob {
    /// Execute the run. Progress lines (one per copied tag) go to `progress`.
    pub async fn run(mut self, progress: &Option<mpsc::UnboundedSender<String>>) -> Result<Outcome> {
        match self.destination.as_mut() {
            None => Ok(Outcome::Inspected(
                fetch_manifests(&mut self.source, self.filter.as_ref()).await?,
            )),
            Some(destination) => Ok(Outcome::Copied(
                copy_tags(&mut self.source, destination, self.filter.as_ref(), progress).await?,
            )),
        }
    }
}

/// Fetch the source manifest, or the manifests of all tags matching `filter`
pub async fn fetch_manifests(
    source: &mut RegistryImage,
    filter: Option<&TagFilter>,
) -> Result<ManifestOutput> {
    let Some(filter) = filter else {
        let manifest = source.manifest().await?;
        return Ok(ManifestOutput::Single(manifest.content()?));
    };

    let mut manifests = Map::new();
    for tag in matching_tags(source, filter).await? {
        source.set_reference(tag.as_str());
        let manifest = source.manifest().await?;
        manifests.insert(tag, manifest.content()?);
    }

    Ok(ManifestOutput::Tagged(manifests))
}

/// Copy the source to the destination, or every tag matching `filter`.
///
/// Tags are copied strictly in order. The first failure stops the run;
/// tags copied before it stay copied and are listed in the error.
pub async fn copy_tags(
    source: &mut RegistryImage,
    destination: &mut RegistryImage,
    filter: Option<&TagFilter>,
    progress: &Option<mpsc::UnboundedSender<String>>,
) -> Result<CopyReport> {
    let Some(filter) = filter else {
        send_progress(progress, &format!("Copying {} to {}", source, destination));
        source.copy_to(destination).await?;
        return Ok(CopyReport {
            copied: vec![source.reference().to_string()],
        });
    };

    let mut report = CopyReport::default();
    for tag in matching_tags(source, filter).await? {
        source.set_reference(tag.as_str());
        destination.set_reference(tag.as_str());

        send_progress(progress, &format!("Copying {} to {}", source, destination));
        if let Err(e) = source.copy_to(destination).await {
            tracing::error!("Copy of tag '{}' failed: {}", tag, e);
            return Err(CoreError::TagCopyFailed {
                tag,
                copied: report.copied,
                source: Box::new(e),
            });
        }
        report.copied.push(tag);
    }

    tracing::info!("Copied {} tag(s)", report.copied.len());
    Ok(report)
}

async fn matching_tags(source: &RegistryImage, filter: &TagFilter) -> Result<Vec<String>> {
    let tags = source.tags().await?;
    let selected = filter.select(&tags);
    tracing::debug!(
        "{} of {} tags in {} match",
        selected.len(),
        tags.len(),
        source.repository()
    );
    Ok(selected)
}

/// Send a progress message if a channel is provided
fn send_progress(progress: &Option<mpsc::UnboundedSender<String>>, msg: &str) {
    if let Some(tx) = progress {
        let _ = tx.send(msg.to_string());
    }
}
