//! Docker credential helper invocation
//!
//! Helpers are external programs named `docker-credential-<name>`. The `get`
//! action reads the server URL on stdin and prints
//! `{"Username": "...", "Secret": "..."}` on stdout.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Prefix of every credential helper program
pub const HELPER_PREFIX: &str = "docker-credential-";

/// Runs a credential helper's `get` action.
///
/// Returns the helper's stdout, or `None` if the helper could not be started
/// or exited unsuccessfully.
#[async_trait]
pub trait HelperRunner: Send + Sync {
    async fn get(&self, helper: &str, host: &str) -> Option<String>;
}

/// Runs helpers as child processes found on `PATH`
#[derive(Debug, Clone)]
pub struct ProcessHelperRunner {
    prefix: String,
}

impl Default for ProcessHelperRunner {
    fn default() -> Self {
        Self {
            prefix: HELPER_PREFIX.to_string(),
        }
    }
}

impl ProcessHelperRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom program prefix, e.g. an absolute directory plus
    /// `docker-credential-`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn program(&self, helper: &str) -> String {
        format!("{}{}", self.prefix, helper)
    }
}

#[async_trait]
impl HelperRunner for ProcessHelperRunner {
    async fn get(&self, helper: &str, host: &str) -> Option<String> {
        let program = self.program(helper);

        let mut child = match Command::new(&program)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::info!("Failed to spawn credential helper '{}': {}", program, e);
                return None;
            }
        };

        // Closing stdin signals end of input to the helper
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(host.as_bytes()).await {
                tracing::info!("Failed to write to credential helper '{}': {}", program, e);
                return None;
            }
        }

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => {
                tracing::info!("Credential helper '{}' failed: {}", program, e);
                return None;
            }
        };

        if !output.status.success() {
            tracing::info!(
                "Credential helper '{}' returned {} for '{}'",
                program,
                output.status,
                host
            );
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
