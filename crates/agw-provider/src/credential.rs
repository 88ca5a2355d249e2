use crate::config::ProviderConfig;
use crate::errors::{ProviderError, ProviderResult};

/// A pre-validated caller. The auth collaborator builds this; configs are in
/// user-insertion order, which the resolver depends on.
#[derive(Debug, Clone)]
pub struct CallerCredential {
    pub key_id: String,
    pub configs: Vec<ProviderConfig>,
}

/// Opaque secret access. Decryption is the collaborator's concern; the core
/// calls this lazily, immediately before the upstream request, and holds the
/// plaintext no longer than that call.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, config: &ProviderConfig) -> ProviderResult<String>;
}

/// Secrets stored in the clear (tests, single-user deployments).
#[derive(Debug, Default)]
pub struct PlainSecrets;

impl SecretResolver for PlainSecrets {
    fn resolve(&self, config: &ProviderConfig) -> ProviderResult<String> {
        if config.secret.is_empty() {
            return Err(ProviderError::MissingSecret("provider secret"));
        }
        Ok(config.secret.clone())
    }
}
