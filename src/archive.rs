//! Remote archive search clients.
//!
//! Discovery asks an archive for scenes acquired after a watermark inside a
//! region of interest. The concrete client here speaks a plain JSON-over-HTTP
//! search endpoint; anything fancier (object storage listings, vendor SDKs)
//! stays behind the [`ArchiveSearch`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::BoundingBox;
use crate::sensors::SensorKind;

/// One scene as reported by the source archive, before it has a PID.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredScene {
    /// Natural key at the source archive.
    pub scene_id: String,
    pub platform: Option<String>,
    pub instrument: Option<String>,
    pub acquired_at: DateTime<Utc>,
    /// Archive-side processing/product date.
    pub product_date: Option<DateTime<Utc>>,
    pub north_lat: f64,
    pub south_lat: f64,
    pub east_lon: f64,
    pub west_lon: f64,
    pub cloud_cover: Option<f64>,
    pub remote_url: Option<String>,
    pub remote_filename: Option<String>,
    pub remote_checksum: Option<String>,
    pub total_size: Option<i64>,
}

impl DiscoveredScene {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            north: self.north_lat,
            south: self.south_lat,
            east: self.east_lon,
            west: self.west_lon,
        }
    }
}

/// Query interface onto a remote scene archive.
#[async_trait]
pub trait ArchiveSearch: Send + Sync {
    /// Find scenes acquired strictly after `since` intersecting `roi`.
    ///
    /// Implementations are expected to page internally and return the full
    /// result set for the window.
    async fn search(
        &self,
        sensor: SensorKind,
        since: DateTime<Utc>,
        roi: Option<BoundingBox>,
    ) -> anyhow::Result<Vec<DiscoveredScene>>;
}

/// Response page from the HTTP search endpoint.
#[derive(Debug, Deserialize)]
struct SearchPage {
    scenes: Vec<DiscoveredScene>,
    #[serde(default)]
    next: Option<String>,
}

/// Archive client speaking a JSON search endpoint over HTTP.
///
/// The endpoint takes `sensor`, `acquired_after` and optional bbox query
/// parameters and returns `{"scenes": [...], "next": "<url>"}` pages.
pub struct HttpArchive {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpArchive {
    pub fn new(endpoint: url::Url, timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("eoacquire/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint })
    }

    async fn fetch_page(&self, url: url::Url) -> anyhow::Result<SearchPage> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("archive search {url} failed with status {status}");
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ArchiveSearch for HttpArchive {
    async fn search(
        &self,
        sensor: SensorKind,
        since: DateTime<Utc>,
        roi: Option<BoundingBox>,
    ) -> anyhow::Result<Vec<DiscoveredScene>> {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("sensor", sensor.as_str());
            query.append_pair("acquired_after", &since.to_rfc3339());
            if let Some(roi) = roi {
                query.append_pair("north", &roi.north.to_string());
                query.append_pair("south", &roi.south.to_string());
                query.append_pair("east", &roi.east.to_string());
                query.append_pair("west", &roi.west.to_string());
            }
        }

        let mut scenes = Vec::new();
        let mut page = self.fetch_page(url).await?;
        loop {
            scenes.append(&mut page.scenes);
            match page.next.take() {
                Some(next) => {
                    let next_url = url::Url::parse(&next)?;
                    page = self.fetch_page(next_url).await?;
                }
                None => break,
            }
        }

        tracing::info!(
            sensor = %sensor,
            count = scenes.len(),
            "archive search returned scenes"
        );
        Ok(scenes)
    }
}
