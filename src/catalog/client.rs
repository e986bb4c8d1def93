//! HTTP client for the catalog metadata service.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::models::{
    ArtistDiscography, CatalogAlbum, CatalogEntity, CatalogKind, CatalogPlaylist, TrackDescriptor,
};

/// Errors returned while turning a catalog URL into records.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(String),

    #[error("Catalog request failed: {0}")]
    Request(String),

    #[error("Failed to decode {kind} response: {message}")]
    Decode { kind: &'static str, message: String },
}

/// Source of catalog records.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch the entity a catalog URL points at.
    async fn fetch(&self, catalog_url: &str) -> Result<CatalogEntity, CatalogError>;
}

fn catalog_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"spotify\.com/(track|album|playlist|artist)/([a-zA-Z0-9]+)")
            .expect("catalog URL regex is valid")
    })
}

/// Split a catalog URL or URI into its entity kind and id.
///
/// Accepts `spotify:<kind>:<id>` URIs and `https://open.spotify.com/<kind>/<id>` URLs.
pub fn parse_catalog_url(url: &str) -> Option<(CatalogKind, String)> {
    if let Some(rest) = url.strip_prefix("spotify:") {
        let mut parts = rest.split(':');
        let kind = parts.next().and_then(CatalogKind::parse)?;
        let id = parts.next().filter(|id| !id.is_empty())?;
        return Some((kind, id.to_string()));
    }

    let captures = catalog_url_regex().captures(url)?;
    let kind = CatalogKind::parse(captures.get(1)?.as_str())?;
    Some((kind, captures.get(2)?.as_str().to_string()))
}

/// Catalog client backed by a REST service exposing `GET <base>/<kind>/<id>`.
#[derive(Clone)]
pub struct CatalogApiClient {
    client: Client,
    base_url: String,
}

impl CatalogApiClient {
    pub fn new(base_url: String, timeout_sec: u64) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()?;

        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: CatalogKind,
    body: &[u8],
) -> Result<T, CatalogError> {
    serde_json::from_slice(body).map_err(|e| CatalogError::Decode {
        kind: kind.as_str(),
        message: e.to_string(),
    })
}

#[async_trait]
impl CatalogClient for CatalogApiClient {
    async fn fetch(&self, catalog_url: &str) -> Result<CatalogEntity, CatalogError> {
        let (kind, id) = parse_catalog_url(catalog_url)
            .ok_or_else(|| CatalogError::InvalidUrl(catalog_url.to_string()))?;

        let url = format!("{}/{}/{}", self.base_url, kind.as_str(), id);
        debug!("Fetching catalog {} {} from {}", kind.as_str(), id, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Request(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        let entity = match kind {
            CatalogKind::Track => CatalogEntity::Track(decode::<TrackDescriptor>(kind, &body)?),
            CatalogKind::Album => CatalogEntity::Album(decode::<CatalogAlbum>(kind, &body)?),
            CatalogKind::Playlist => {
                CatalogEntity::Playlist(decode::<CatalogPlaylist>(kind, &body)?)
            }
            CatalogKind::Artist => {
                CatalogEntity::Artist(decode::<ArtistDiscography>(kind, &body)?)
            }
        };

        Ok(entity)
    }
}
