//! The upstream map catalog (§6): random/latest/info/pack/TOTD endpoints,
//! represented as a narrow async trait with one HTTP-backed client.

use crate::domain::{Map, MapPack};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct TotdBatch {
    pub maps: Vec<Map>,
    /// Seconds to wait before polling again, as reported by the upstream service.
    pub relative_next_request: u64,
}

#[async_trait]
pub trait MapCatalogClient: Send + Sync {
    async fn random_maps(&self, count: usize) -> anyhow::Result<Vec<Map>>;
    async fn latest_maps(&self, count: usize) -> anyhow::Result<Vec<Map>>;
    async fn map_info(&self, track_id: &str) -> anyhow::Result<Option<Map>>;
    async fn map_pack_info(&self, pack_id: &str) -> anyhow::Result<Option<MapPack>>;
    async fn totd(&self) -> anyhow::Result<TotdBatch>;
}

/// Talks to the upstream map-exchange service over HTTP.
pub struct HttpMapCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMapCatalogClient {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl MapCatalogClient for HttpMapCatalogClient {
    async fn random_maps(&self, count: usize) -> anyhow::Result<Vec<Map>> {
        let url = format!(
            "{}/mapsearch2/search?api=on&random=1&etags=40&count={count}",
            self.base_url
        );
        let maps: Vec<Map> = self.client.get(url).send().await?.json().await?;
        Ok(maps)
    }

    async fn latest_maps(&self, count: usize) -> anyhow::Result<Vec<Map>> {
        let url = format!("{}/mapsearch2/search?api=on&order=2&count={count}", self.base_url);
        let maps: Vec<Map> = self.client.get(url).send().await?.json().await?;
        Ok(maps)
    }

    async fn map_info(&self, track_id: &str) -> anyhow::Result<Option<Map>> {
        let url = format!("{}/api/maps/{track_id}", self.base_url);
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }

    async fn map_pack_info(&self, pack_id: &str) -> anyhow::Result<Option<MapPack>> {
        let url = format!("{}/api/mappacks/{pack_id}", self.base_url);
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }

    async fn totd(&self) -> anyhow::Result<TotdBatch> {
        #[derive(serde::Deserialize)]
        struct TotdResponse {
            maps: Vec<Map>,
            #[serde(rename = "relativeNextRequest")]
            relative_next_request: u64,
        }
        let url = format!("{}/api/totd/latest", self.base_url);
        let parsed: TotdResponse = self.client.get(url).send().await?.json().await?;
        Ok(TotdBatch {
            maps: parsed.maps,
            relative_next_request: parsed.relative_next_request,
        })
    }
}
