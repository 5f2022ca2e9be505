//! Docker Registry HTTP API v2 client

use crate::challenge::{next_link, parse_challenge, Challenge};
use crate::{Manifest, Registry, RegistryError, Result, MANIFEST_ACCEPT};
use async_trait::async_trait;
use regcopy_auth::{Credential, CredentialStore};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK, LOCATION, WWW_AUTHENTICATE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry API endpoint serving Docker Hub
const DOCKER_HUB_ENDPOINT: &str = "https://registry-1.docker.io";

/// Client id sent when exchanging identity tokens
const CLIENT_ID: &str = "regcopy";

/// Connection options for a registry
#[derive(Debug, Clone, Default)]
pub struct HttpRegistryOptions {
    /// Additional PEM CA certificate to trust
    pub ca_certificate: Option<PathBuf>,
}

/// Authorization obtained for one scope
#[derive(Debug, Clone)]
enum Authorization {
    Bearer(String),
    Basic(Credential),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Registry client speaking the Docker Registry HTTP API v2.
///
/// Authentication happens on demand: a request answered with 401 is retried
/// once after satisfying the registry's challenge with credentials from the
/// client's [`CredentialStore`]. Tokens are cached per scope.
pub struct HttpRegistry {
    host: String,
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    authorizations: Mutex<HashMap<String, Authorization>>,
}

impl HttpRegistry {
    pub fn new(
        host: &str,
        credentials: Arc<dyn CredentialStore>,
        options: &HttpRegistryOptions,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("regcopy/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &options.ca_certificate {
            let pem = std::fs::read(path).map_err(|e| RegistryError::InvalidCertificate {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let cert =
                reqwest::Certificate::from_pem(&pem).map_err(|e| RegistryError::InvalidCertificate {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| RegistryError::Client(e.to_string()))?;

        Ok(Self {
            host: host.to_string(),
            base_url: endpoint(host),
            client,
            credentials,
            authorizations: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Resolve a possibly relative URL returned by the registry
    fn resolve(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            self.url(location)
        }
    }

    /// Send a request, authenticating and retrying once on 401
    async fn send(
        &self,
        method: Method,
        url: &str,
        scope: &str,
        customize: impl Fn(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response> {
        let cached = self.authorizations.lock().await.get(scope).cloned();
        let request = customize(self.client.request(method.clone(), url));
        let response = authorize(request, cached.as_ref())
            .send()
            .await
            .map_err(|e| http_error(url, e))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_challenge)
            .ok_or_else(|| RegistryError::Auth {
                registry: self.host.clone(),
                reason: format!("{} {} returned 401 without a usable challenge", method, url),
            })?;

        let authorization = self.authenticate(&challenge, scope).await?;
        self.authorizations
            .lock()
            .await
            .insert(scope.to_string(), authorization.clone());

        let request = customize(self.client.request(method, url));
        authorize(request, Some(&authorization))
            .send()
            .await
            .map_err(|e| http_error(url, e))
    }

    async fn authenticate(&self, challenge: &Challenge, scope: &str) -> Result<Authorization> {
        let credential = self.credentials.get(&self.host).await;

        match challenge {
            Challenge::Basic => {
                let credential = credential.ok_or_else(|| RegistryError::Auth {
                    registry: self.host.clone(),
                    reason: "registry requires credentials but none are configured".to_string(),
                })?;
                Ok(Authorization::Basic(credential))
            }
            Challenge::Bearer {
                realm,
                service,
                scope: challenge_scope,
            } => {
                let scope = if scope.is_empty() {
                    challenge_scope.as_deref().unwrap_or_default()
                } else {
                    scope
                };
                let token = self
                    .fetch_token(realm, service.as_deref(), scope, credential.as_ref())
                    .await?;
                Ok(Authorization::Bearer(token))
            }
        }
    }

    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        credential: Option<&Credential>,
    ) -> Result<String> {
        tracing::debug!("Requesting token from {} for scope '{}'", realm, scope);

        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(service) = service {
            params.push(("service", service));
        }
        if !scope.is_empty() {
            params.push(("scope", scope));
        }

        let request = match credential {
            Some(cred) if cred.is_identity_token() => {
                params.push(("grant_type", "refresh_token"));
                params.push(("client_id", CLIENT_ID));
                params.push(("refresh_token", cred.secret.as_str()));
                self.client.post(realm).form(&params)
            }
            Some(cred) => self
                .client
                .get(realm)
                .query(&params)
                .basic_auth(&cred.username, Some(&cred.secret)),
            None => self.client.get(realm).query(&params),
        };

        let response = request.send().await.map_err(|e| http_error(realm, e))?;
        if !response.status().is_success() {
            return Err(RegistryError::Auth {
                registry: self.host.clone(),
                reason: format!("token endpoint {} returned {}", realm, response.status()),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| RegistryError::Auth {
            registry: self.host.clone(),
            reason: format!("failed to parse token response: {}", e),
        })?;

        token
            .token
            .or(token.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RegistryError::Auth {
                registry: self.host.clone(),
                reason: "token response did not contain a token".to_string(),
            })
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    fn host(&self) -> &str {
        &self.host
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        let scope = pull_scope(repository);
        let mut url = self.url(&format!("/v2/{}/tags/list", repository));
        let mut tags = Vec::new();

        loop {
            let response = self.send(Method::GET, &url, &scope, |r| r).await?;
            let response = check_status(response, "GET", &url)?;

            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);

            let page: TagList = response.json().await.map_err(|e| {
                RegistryError::InvalidResponse(format!("tag list from {}: {}", url, e))
            })?;
            tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(link) => url = self.resolve(&link),
                None => break,
            }
        }

        tracing::debug!("{}/{} has {} tags", self.host, repository, tags.len());
        Ok(tags)
    }

    async fn get_manifest(&self, repository: &str, reference: &str) -> Result<Manifest> {
        let url = self.url(&format!("/v2/{}/manifests/{}", repository, reference));
        let accept = MANIFEST_ACCEPT.join(", ");

        let response = self
            .send(Method::GET, &url, &pull_scope(repository), |r| {
                r.header(ACCEPT, accept.as_str())
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::ManifestNotFound(format!(
                "{}/{}:{}",
                self.host, repository, reference
            )));
        }
        let response = check_status(response, "GET", &url)?;

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response.bytes().await.map_err(|e| http_error(&url, e))?;

        Ok(Manifest::new(media_type.as_deref(), data.to_vec()))
    }

    async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<()> {
        let url = self.url(&format!("/v2/{}/manifests/{}", repository, reference));

        let response = self
            .send(Method::PUT, &url, &push_scope(repository), |r| {
                r.header(CONTENT_TYPE, manifest.media_type.as_str())
                    .body(manifest.data.clone())
            })
            .await?;
        check_status(response, "PUT", &url)?;

        tracing::debug!("Pushed manifest {}/{}:{}", self.host, repository, reference);
        Ok(())
    }

    async fn has_blob(&self, repository: &str, digest: &str) -> Result<bool> {
        let url = self.url(&format!("/v2/{}/blobs/{}", repository, digest));

        let response = self
            .send(Method::HEAD, &url, &pull_scope(repository), |r| r)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(RegistryError::Status {
                method: "HEAD".to_string(),
                url,
                status: status.as_u16(),
            }),
        }
    }

    async fn get_blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("/v2/{}/blobs/{}", repository, digest));

        let response = self
            .send(Method::GET, &url, &pull_scope(repository), |r| r)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::BlobNotFound(format!(
                "{}/{}@{}",
                self.host, repository, digest
            )));
        }
        let response = check_status(response, "GET", &url)?;

        let data = response.bytes().await.map_err(|e| http_error(&url, e))?;
        Ok(data.to_vec())
    }

    async fn put_blob(&self, repository: &str, digest: &str, data: Vec<u8>) -> Result<()> {
        let scope = push_scope(repository);
        let url = self.url(&format!("/v2/{}/blobs/uploads/", repository));

        let response = self.send(Method::POST, &url, &scope, |r| r).await?;
        let response = check_status(response, "POST", &url)?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                RegistryError::InvalidResponse(format!("upload to {} returned no Location", url))
            })?;
        let location = self.resolve(location);
        let separator = if location.contains('?') { '&' } else { '?' };
        let upload_url = format!("{}{}digest={}", location, separator, digest);

        let size = data.len();
        let response = self
            .send(Method::PUT, &upload_url, &scope, |r| {
                r.header(CONTENT_TYPE, "application/octet-stream")
                    .body(data.clone())
            })
            .await?;
        check_status(response, "PUT", &upload_url)?;

        tracing::debug!(
            "Uploaded blob {} ({} bytes) to {}/{}",
            digest,
            size,
            self.host,
            repository
        );
        Ok(())
    }
}

/// Base URL of the registry API for an image-reference host
fn endpoint(host: &str) -> String {
    if host == "docker.io" || host == "index.docker.io" {
        return DOCKER_HUB_ENDPOINT.to_string();
    }

    let name = host.split(':').next().unwrap_or(host);
    if name == "localhost" || name == "127.0.0.1" {
        format!("http://{}", host)
    } else {
        format!("https://{}", host)
    }
}

fn pull_scope(repository: &str) -> String {
    format!("repository:{}:pull", repository)
}

fn push_scope(repository: &str) -> String {
    format!("repository:{}:pull,push", repository)
}

fn authorize(request: RequestBuilder, authorization: Option<&Authorization>) -> RequestBuilder {
    match authorization {
        Some(Authorization::Bearer(token)) => request.bearer_auth(token),
        Some(Authorization::Basic(cred)) => request.basic_auth(&cred.username, Some(&cred.secret)),
        None => request,
    }
}

fn check_status(response: Response, method: &str, url: &str) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(RegistryError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status: response.status().as_u16(),
        })
    }
}

fn http_error(url: &str, source: reqwest::Error) -> RegistryError {
    RegistryError::Http {
        url: url.to_string(),
        source,
    }
}
