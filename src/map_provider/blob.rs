//! The external blob store (§6): object put/get/head by key, keyed
//! `"<track_id>.Map.Gbx"`. Represented as a narrow async trait.

use crate::config::BlobStoreSecrets;
use crate::retry::{RetryConfig, RetryExecutor};
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn is_cached(&self, key: &str) -> anyhow::Result<bool>;
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()>;
    async fn download(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

#[must_use]
pub fn map_binary_key(track_id: &str) -> String {
    format!("{track_id}.Map.Gbx")
}

/// HTTP-backed blob store: `HEAD` for existence, `PUT` with public-read ACL
/// for uploads, `GET` for downloads. Retries lazily-fetched binaries with a
/// 10-attempt, 10-s-backoff policy (§4.10(4)).
pub struct HttpBlobStore {
    client: reqwest::Client,
    service_url: String,
    bucket_name: String,
    retry: RetryExecutor,
}

impl HttpBlobStore {
    #[must_use]
    pub fn new(secrets: &BlobStoreSecrets) -> Option<Self> {
        let service_url = secrets.service_url.clone()?;
        let bucket_name = secrets.bucket_name.clone().unwrap_or_default();
        Some(Self {
            client: reqwest::Client::new(),
            service_url,
            bucket_name,
            retry: RetryExecutor::new(RetryConfig::blob_store(10, 10)),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{key}", self.service_url, self.bucket_name)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn is_cached(&self, key: &str) -> anyhow::Result<bool> {
        let response = self.client.head(self.object_url(key)).send().await?;
        Ok(response.status().is_success())
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let url = self.object_url(key);
        self.retry
            .execute("blob_store.upload", || {
                let bytes = bytes.clone();
                let url = url.clone();
                async move {
                    self.client
                        .put(url)
                        .header("x-amz-acl", "public-read")
                        .body(bytes)
                        .send()
                        .await?
                        .error_for_status()
                }
            })
            .await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.object_url(key);
        let response = self
            .retry
            .execute("blob_store.download", || {
                let url = url.clone();
                async move { self.client.get(url).send().await?.error_for_status() }
            })
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_binary_key_matches_the_gbx_convention() {
        assert_eq!(map_binary_key("AbC123"), "AbC123.Map.Gbx");
    }
}
