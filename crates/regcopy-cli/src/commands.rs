//! CLI command implementation

use crate::Cli;
use anyhow::{Context, Result};
use regcopy_auth::{parse_user, CredentialStore, DockerCredentialStore};
use regcopy_config::{ConfigError, DockerAuthConfig};
use regcopy_core::{Outcome, RegistryImage, ReplicationJob, TagFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Inspect or copy according to the command line
pub async fn execute(cli: Cli) -> Result<()> {
    // Validate everything local before touching the network
    let store = load_credential_store(cli.auth_config.as_deref())?;

    let filter = if cli.tag_patterns.is_empty() {
        None
    } else {
        Some(TagFilter::new(cli.tag_patterns.as_slice())?)
    };

    let src_user = parse_user(&cli.src_user).context("Invalid --src-user")?;
    let source = RegistryImage::connect(&cli.src, src_user, cli.src_ca, store.clone())
        .context("Invalid source image")?;

    let destination = match &cli.dst {
        Some(dst) => {
            let dst_user = parse_user(&cli.dst_user).context("Invalid --dst-user")?;
            Some(
                RegistryImage::connect(dst, dst_user, cli.dst_ca, store)
                    .context("Invalid destination image")?,
            )
        }
        None => None,
    };

    let job = ReplicationJob {
        source,
        destination,
        filter,
    };

    // Print progress lines as they arrive
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("{}", line);
        }
    });

    let progress = Some(tx);
    let result = job.run(&progress).await;
    drop(progress);
    let _ = printer.await;

    match result? {
        Outcome::Inspected(manifests) => {
            println!("{}", serde_json::to_string_pretty(&manifests)?);
        }
        Outcome::Copied(report) => {
            tracing::debug!("Copied tags: {}", report.copied.join(", "));
        }
    }

    Ok(())
}

/// Build the config-backed credential store, if there is a config file
fn load_credential_store(path: Option<&str>) -> Result<Option<Arc<dyn CredentialStore>>> {
    let path = match path {
        Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
        None => match DockerAuthConfig::default_path() {
            Ok(path) => path,
            Err(ConfigError::NoHomeDir) => {
                tracing::debug!("No home directory, skipping Docker config");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        },
    };

    let store = DockerAuthConfig::load_from(&path)?
        .map(|config| Arc::new(DockerCredentialStore::new(&config)) as Arc<dyn CredentialStore>);
    Ok(store)
}
