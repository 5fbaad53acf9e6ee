//! Credentials for the out-of-scope external collaborators (§6).
//!
//! These are opaque pass-throughs: the core never inspects their contents beyond
//! handing them to the respective HTTP client. `Debug` is hand-rolled so error
//! logs never print a credential. `--print-config` takes a separate path:
//! [`super::types::Config::redacted_for_display`] blanks this whole section
//! before serializing, since these still derive `Serialize` for normal
//! config round-tripping.

use serde::{Deserialize, Serialize};

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct BlobStoreSecrets {
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct IdentityVerifierSecrets {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct GameHostProvisionerSecrets {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub blob_store: BlobStoreSecrets,
    #[serde(default)]
    pub identity_verifier: IdentityVerifierSecrets,
    #[serde(default)]
    pub game_host_provisioner: GameHostProvisionerSecrets,
}

fn redacted(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

impl std::fmt::Debug for BlobStoreSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStoreSecrets")
            .field("access_key", &redacted(&self.access_key))
            .field("secret_key", &redacted(&self.secret_key))
            .field("service_url", &redacted(&self.service_url))
            .field("bucket_name", &redacted(&self.bucket_name))
            .finish()
    }
}

impl std::fmt::Debug for IdentityVerifierSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifierSecrets")
            .field("secret", &redacted(&self.secret))
            .field("url", &redacted(&self.url))
            .finish()
    }
}

impl std::fmt::Debug for GameHostProvisionerSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameHostProvisionerSecrets")
            .field("email", &redacted(&self.email))
            .field("password", &redacted(&self.password))
            .finish()
    }
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("blob_store", &self.blob_store)
            .field("identity_verifier", &self.identity_verifier)
            .field("game_host_provisioner", &self.game_host_provisioner)
            .finish()
    }
}
