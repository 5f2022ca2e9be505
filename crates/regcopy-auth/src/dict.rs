//! In-memory credential store

use crate::{Credential, CredentialStore};
use async_trait::async_trait;
use std::collections::HashMap;

/// Credential store backed by a fixed host → credential map.
///
/// Hosts are looked up verbatim; no alias normalization is applied.
#[derive(Debug, Clone, Default)]
pub struct DictCredentialStore {
    auths: HashMap<String, Credential>,
}

impl DictCredentialStore {
    pub fn new(auths: HashMap<String, Credential>) -> Self {
        Self { auths }
    }

    /// Store holding a single credential for one host
    pub fn single(host: impl Into<String>, credential: Credential) -> Self {
        Self::new(HashMap::from([(host.into(), credential)]))
    }
}

#[async_trait]
impl CredentialStore for DictCredentialStore {
    async fn get(&self, host: &str) -> Option<Credential> {
        self.auths.get(host).cloned()
    }
}
