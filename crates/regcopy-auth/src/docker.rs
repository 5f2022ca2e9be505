//! Docker config backed credential store
//!
//! Resolves credentials the way the Docker CLI does: literal `auths` entries
//! first, then the registry's `credHelpers` entry, then `credsStore`.
//! Helper results are memoized for the lifetime of the store.

use crate::helper::{HelperRunner, ProcessHelperRunner};
use crate::{Credential, CredentialStore};
use async_trait::async_trait;
use base64::Engine;
use regcopy_config::DockerAuthConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Key Docker uses for Docker Hub credentials
pub const DOCKER_HUB_INDEX: &str = "https://index.docker.io/v1/";

/// Map registry aliases onto the key Docker stores their credentials under
pub fn normalize_host(host: &str) -> &str {
    match host {
        "docker.io" => DOCKER_HUB_INDEX,
        _ => host,
    }
}

/// Cached lookup outcome. A host missing from the cache has not been looked up.
#[derive(Debug, Clone)]
enum CacheEntry {
    Present(Credential),
    Absent,
}

impl CacheEntry {
    fn credential(&self) -> Option<Credential> {
        match self {
            CacheEntry::Present(cred) => Some(cred.clone()),
            CacheEntry::Absent => None,
        }
    }
}

/// Response from a credential helper
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: Option<String>,
    secret: Option<String>,
}

/// Credential store that understands the Docker credentials config format
pub struct DockerCredentialStore {
    default_helper: Option<String>,
    host_helpers: HashMap<String, String>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    runner: Arc<dyn HelperRunner>,
}

impl DockerCredentialStore {
    /// Build a store that runs helpers as child processes
    pub fn new(config: &DockerAuthConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessHelperRunner::new()))
    }

    /// Build a store with a custom helper runner
    pub fn with_runner(config: &DockerAuthConfig, runner: Arc<dyn HelperRunner>) -> Self {
        let mut cache = HashMap::new();
        for (host, entry) in &config.auths {
            let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) else {
                continue;
            };
            match decode_auth(auth) {
                Some(cred) => {
                    cache.insert(host.clone(), CacheEntry::Present(cred));
                }
                None => tracing::warn!("Ignoring malformed auth entry for '{}'", host),
            }
        }

        Self {
            default_helper: config.creds_store.clone().filter(|s| !s.is_empty()),
            host_helpers: config.cred_helpers.clone(),
            cache: Mutex::new(cache),
            runner,
        }
    }

    fn helper_for(&self, host: &str) -> Option<&str> {
        self.host_helpers
            .get(host)
            .or(self.default_helper.as_ref())
            .map(String::as_str)
    }

    async fn query_helper(&self, helper: &str, host: &str) -> Option<Credential> {
        tracing::info!("Querying {} for {}", helper, host);

        let stdout = self.runner.get(helper, host).await?;
        let response = match parse_response(&stdout) {
            Ok(response) => response,
            Err(e) => {
                tracing::info!("Failed to parse response from helper '{}': {}", helper, e);
                return None;
            }
        };

        match (response.username, response.secret) {
            (Some(username), Some(secret)) if !username.is_empty() && !secret.is_empty() => {
                Some(Credential { username, secret })
            }
            _ => {
                tracing::info!("Helper '{}' has no credentials for {}", helper, host);
                None
            }
        }
    }
}

#[async_trait]
impl CredentialStore for DockerCredentialStore {
    async fn get(&self, host: &str) -> Option<Credential> {
        let host = normalize_host(host);

        // Held across the helper call so each host is queried at most once
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(host) {
            return entry.credential();
        }

        let helper = self.helper_for(host)?;
        let result = self.query_helper(helper, host).await;

        let entry = match &result {
            Some(cred) => CacheEntry::Present(cred.clone()),
            None => CacheEntry::Absent,
        };
        cache.insert(host.to_string(), entry);

        result
    }
}

/// Parse helper stdout, which must be a JSON object
fn parse_response(stdout: &str) -> serde_json::Result<HelperResponse> {
    let value: serde_json::Value = serde_json::from_str(stdout)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("expected a JSON object"));
    }
    serde_json::from_value(value)
}

/// Decode base64-encoded "username:password" auth string
fn decode_auth(auth: &str) -> Option<Credential> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, secret) = decoded.split_once(':')?;
    Some(Credential::new(username, secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Helper runner answering from a fixed table and recording invocations
    #[derive(Default)]
    struct FakeRunner {
        responses: HashMap<(String, String), Option<String>>,
        calls: std::sync::Mutex<Vec<(String, String)>>,
        delay: Duration,
    }

    impl FakeRunner {
        fn respond(mut self, helper: &str, host: &str, stdout: Option<&str>) -> Self {
            self.responses.insert(
                (helper.to_string(), host.to_string()),
                stdout.map(str::to_string),
            );
            self
        }

        /// Make every invocation take `delay` before answering
        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HelperRunner for FakeRunner {
        async fn get(&self, helper: &str, host: &str) -> Option<String> {
            self.calls
                .lock()
                .unwrap()
                .push((helper.to_string(), host.to_string()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .get(&(helper.to_string(), host.to_string()))
                .cloned()
                .flatten()
        }
    }

    fn config(json: &str) -> DockerAuthConfig {
        DockerAuthConfig::from_json(json).unwrap()
    }

    fn encode(value: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(value)
    }

    #[test]
    fn test_decode_auth() {
        assert_eq!(
            decode_auth(&encode("testuser:testpass")),
            Some(Credential::new("testuser", "testpass"))
        );
    }

    #[test]
    fn test_decode_auth_with_colon_in_password() {
        assert_eq!(
            decode_auth(&encode("user:pass:word")),
            Some(Credential::new("user", "pass:word"))
        );
    }

    #[test]
    fn test_decode_auth_invalid() {
        assert_eq!(decode_auth("!!not base64!!"), None);
        assert_eq!(decode_auth(&encode("no-colon")), None);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("docker.io"), DOCKER_HUB_INDEX);
        assert_eq!(normalize_host("ghcr.io"), "ghcr.io");
    }

    #[tokio::test]
    async fn test_literal_auth_skips_helper() {
        let json = format!(
            r#"{{"credsStore": "desktop", "auths": {{"registry.example.com": {{"auth": "{}"}}}}}}"#,
            encode("alice:secret")
        );
        let runner = Arc::new(FakeRunner::default());
        let store = DockerCredentialStore::with_runner(&config(&json), runner.clone());

        assert_eq!(
            store.get("registry.example.com").await,
            Some(Credential::new("alice", "secret"))
        );
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auth_entry_without_auth_field_is_skipped() {
        let runner = Arc::new(FakeRunner::default().respond(
            "desktop",
            "registry.example.com",
            Some(r#"{"Username":"u","Secret":"s"}"#),
        ));
        let store = DockerCredentialStore::with_runner(
            &config(r#"{"credsStore": "desktop", "auths": {"registry.example.com": {}}}"#),
            runner.clone(),
        );

        assert_eq!(
            store.get("registry.example.com").await,
            Some(Credential::new("u", "s"))
        );
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_helper_result_is_memoized() {
        let runner = Arc::new(FakeRunner::default().respond(
            "desktop",
            "registry.example.com",
            Some(r#"{"ServerURL":"registry.example.com","Username":"u","Secret":"s"}"#),
        ));
        let store =
            DockerCredentialStore::with_runner(&config(r#"{"credsStore": "desktop"}"#), runner.clone());

        let first = store.get("registry.example.com").await;
        let second = store.get("registry.example.com").await;
        assert_eq!(first, Some(Credential::new("u", "s")));
        assert_eq!(first, second);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_query_helper_once() {
        let runner = Arc::new(
            FakeRunner::default()
                .respond(
                    "desktop",
                    DOCKER_HUB_INDEX,
                    Some(r#"{"Username":"hub","Secret":"pw"}"#),
                )
                .slow(Duration::from_millis(50)),
        );
        let store = Arc::new(DockerCredentialStore::with_runner(
            &config(r#"{"credsStore": "desktop"}"#),
            runner.clone(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get("docker.io").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(Credential::new("hub", "pw")));
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_absent_result_is_memoized() {
        let runner = Arc::new(FakeRunner::default().respond(
            "desktop",
            "registry.example.com",
            Some("{}"),
        ));
        let store =
            DockerCredentialStore::with_runner(&config(r#"{"credsStore": "desktop"}"#), runner.clone());

        assert_eq!(store.get("registry.example.com").await, None);
        assert_eq!(store.get("registry.example.com").await, None);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_helper_failure_is_memoized() {
        let runner = Arc::new(FakeRunner::default());
        let store =
            DockerCredentialStore::with_runner(&config(r#"{"credsStore": "missing"}"#), runner.clone());

        assert_eq!(store.get("registry.example.com").await, None);
        assert_eq!(store.get("registry.example.com").await, None);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_helper_output() {
        let runner = Arc::new(
            FakeRunner::default()
                .respond("desktop", "a.example.com", Some("not json"))
                .respond("desktop", "b.example.com", Some(r#"["u", "s"]"#))
                .respond("desktop", "c.example.com", Some(r#"{"Username":"u","Secret":""}"#)),
        );
        let store =
            DockerCredentialStore::with_runner(&config(r#"{"credsStore": "desktop"}"#), runner);

        assert_eq!(store.get("a.example.com").await, None);
        assert_eq!(store.get("b.example.com").await, None);
        assert_eq!(store.get("c.example.com").await, None);
    }

    #[tokio::test]
    async fn test_docker_io_alias() {
        let runner = Arc::new(FakeRunner::default().respond(
            "desktop",
            DOCKER_HUB_INDEX,
            Some(r#"{"Username":"hub","Secret":"pw"}"#),
        ));
        let store =
            DockerCredentialStore::with_runner(&config(r#"{"credsStore": "desktop"}"#), runner.clone());

        assert_eq!(store.get("docker.io").await, Some(Credential::new("hub", "pw")));
        assert_eq!(
            store.get(DOCKER_HUB_INDEX).await,
            Some(Credential::new("hub", "pw"))
        );
        assert_eq!(
            runner.calls(),
            vec![("desktop".to_string(), DOCKER_HUB_INDEX.to_string())]
        );
    }

    #[tokio::test]
    async fn test_docker_io_literal_auth() {
        let json = format!(
            r#"{{"auths": {{"https://index.docker.io/v1/": {{"auth": "{}"}}}}}}"#,
            encode("hub:pw")
        );
        let store = DockerCredentialStore::with_runner(&config(&json), Arc::new(FakeRunner::default()));
        assert_eq!(store.get("docker.io").await, Some(Credential::new("hub", "pw")));
    }

    #[tokio::test]
    async fn test_host_helper_takes_precedence() {
        let runner = Arc::new(
            FakeRunner::default()
                .respond("gcloud", "gcr.io", Some(r#"{"Username":"oauth2accesstoken","Secret":"t"}"#))
                .respond("desktop", "gcr.io", Some(r#"{"Username":"wrong","Secret":"wrong"}"#)),
        );
        let store = DockerCredentialStore::with_runner(
            &config(r#"{"credsStore": "desktop", "credHelpers": {"gcr.io": "gcloud"}}"#),
            runner.clone(),
        );

        assert_eq!(
            store.get("gcr.io").await,
            Some(Credential::new("oauth2accesstoken", "t"))
        );
        assert_eq!(runner.calls(), vec![("gcloud".to_string(), "gcr.io".to_string())]);
    }

    #[tokio::test]
    async fn test_no_helper_configured() {
        let runner = Arc::new(FakeRunner::default());
        let store = DockerCredentialStore::with_runner(&config("{}"), runner.clone());

        assert_eq!(store.get("registry.example.com").await, None);
        assert_eq!(store.get("registry.example.com").await, None);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_identity_token_passthrough() {
        let runner = Arc::new(FakeRunner::default().respond(
            "desktop",
            "registry.example.com",
            Some(r#"{"Username":"<token>","Secret":"refresh-me"}"#),
        ));
        let store =
            DockerCredentialStore::with_runner(&config(r#"{"credsStore": "desktop"}"#), runner);

        let cred = store.get("registry.example.com").await.unwrap();
        assert!(cred.is_identity_token());
        assert_eq!(cred.secret, "refresh-me");
    }
}
