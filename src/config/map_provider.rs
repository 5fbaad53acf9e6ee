//! Random-map provisioning tunables (§4.10).

use super::defaults::{
    default_blob_retry_attempts, default_blob_retry_backoff_secs, default_catalog_base_url,
    default_maintain_n_maps, default_maintain_n_maps_local_dev, default_totd_poll_interval_secs,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MapProviderConfig {
    /// Base URL of the upstream map-exchange catalog (§6).
    #[serde(default = "default_catalog_base_url")]
    pub catalog_base_url: String,
    /// Target size of the background-replenished random pool in production.
    #[serde(default = "default_maintain_n_maps")]
    pub maintain_n_maps: usize,
    /// Target pool size when `server.local_dev` is set.
    #[serde(default = "default_maintain_n_maps_local_dev")]
    pub maintain_n_maps_local_dev: usize,
    /// Retry attempts for blob-store HEAD/PUT calls.
    #[serde(default = "default_blob_retry_attempts")]
    pub blob_retry_attempts: u32,
    /// Backoff between blob-store retries, in seconds.
    #[serde(default = "default_blob_retry_backoff_secs")]
    pub blob_retry_backoff_secs: u64,
    /// Fallback poll interval for the TOTD loop when the upstream omits
    /// `relativeNextRequest`.
    #[serde(default = "default_totd_poll_interval_secs")]
    pub totd_poll_interval_secs: u64,
}

impl Default for MapProviderConfig {
    fn default() -> Self {
        Self {
            catalog_base_url: default_catalog_base_url(),
            maintain_n_maps: default_maintain_n_maps(),
            maintain_n_maps_local_dev: default_maintain_n_maps_local_dev(),
            blob_retry_attempts: default_blob_retry_attempts(),
            blob_retry_backoff_secs: default_blob_retry_backoff_secs(),
            totd_poll_interval_secs: default_totd_poll_interval_secs(),
        }
    }
}
