//! Maps a catalog track id to a download source URL through a public
//! link-aggregation lookup.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::obfuscated;

pub const DEFAULT_LINK_LOOKUP_URL: &str = "https://api.song.link/v1-alpha.1/links";
pub const DEFAULT_CATALOG_TRACK_BASE: &str = "https://open.spotify.com/track/";

/// Platform whose link is used as the download source.
const SOURCE_PLATFORM: &str = "amazonMusic";
const TRACK_ID_PARAM: &str = "trackAsin=";
const DIRECT_TRACK_BASE: &str = "aHR0cHM6Ly9tdXNpYy5hbWF6b24uY29tL3RyYWNrcy8=";
const REGION_QUALIFIER: &str = "musicTerritory=US";

/// Longest body excerpt quoted in decode errors.
const BODY_EXCERPT_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Track id must not be empty")]
    InvalidTrackId,

    #[error("Failed to resolve source URL: {0}")]
    Resolution(String),

    #[error("No {0} link found for track")]
    LinkNotFound(String),
}

#[derive(Debug, Deserialize)]
struct LinkLookupResponse {
    #[serde(rename = "linksByPlatform", default)]
    links_by_platform: HashMap<String, PlatformLink>,
}

#[derive(Debug, Deserialize)]
struct PlatformLink {
    #[serde(default)]
    url: String,
}

/// Rewrite links that carry the track id as a `trackAsin=` query parameter
/// into the direct track form, dropping every other parameter.
pub fn canonicalize_source_url(url: &str) -> String {
    let Some((_, rest)) = url.split_once(TRACK_ID_PARAM) else {
        return url.to_string();
    };
    let track_id = rest.split('&').next().unwrap_or_default();
    if track_id.is_empty() {
        return url.to_string();
    }

    match obfuscated::decode(DIRECT_TRACK_BASE) {
        Ok(base) => format!("{}{}?{}", base, track_id, REGION_QUALIFIER),
        Err(_) => url.to_string(),
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > BODY_EXCERPT_LEN {
        let cut: String = text.chars().take(BODY_EXCERPT_LEN).collect();
        format!("{}...", cut)
    } else {
        text.into_owned()
    }
}

/// Resolves catalog track ids into source URLs. Nothing is cached: every call
/// performs a fresh lookup.
#[derive(Clone)]
pub struct SourceResolver {
    client: Client,
    lookup_url: String,
    catalog_track_base: String,
}

impl SourceResolver {
    pub fn new(client: Client, lookup_url: String, catalog_track_base: String) -> Self {
        Self {
            client,
            lookup_url,
            catalog_track_base,
        }
    }

    /// Catalog page URL for a track id.
    pub fn catalog_url(&self, track_id: &str) -> String {
        format!("{}{}", self.catalog_track_base, track_id)
    }

    pub async fn resolve(&self, track_id: &str) -> Result<String, ResolveError> {
        let track_id = track_id.trim();
        if track_id.is_empty() {
            return Err(ResolveError::InvalidTrackId);
        }

        let catalog_url = self.catalog_url(track_id);
        let lookup = format!(
            "{}?url={}",
            self.lookup_url,
            urlencoding::encode(&catalog_url)
        );

        debug!("Looking up source links for {}", catalog_url);
        let response = self
            .client
            .get(&lookup)
            .send()
            .await
            .map_err(|e| ResolveError::Resolution(format!("lookup request failed: {}", e)))?;

        if response.status().as_u16() != 200 {
            return Err(ResolveError::Resolution(format!(
                "lookup returned status {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ResolveError::Resolution(format!("failed to read response: {}", e)))?;
        if body.is_empty() {
            return Err(ResolveError::Resolution(
                "lookup returned an empty response".to_string(),
            ));
        }

        let parsed: LinkLookupResponse = serde_json::from_slice(&body).map_err(|e| {
            ResolveError::Resolution(format!(
                "failed to decode response: {} (response: {})",
                e,
                excerpt(&body)
            ))
        })?;

        let link = parsed
            .links_by_platform
            .get(SOURCE_PLATFORM)
            .map(|l| l.url.trim())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ResolveError::LinkNotFound(SOURCE_PLATFORM.to_string()))?;

        let source_url = canonicalize_source_url(link);
        info!("Resolved track {} to {}", track_id, source_url);
        Ok(source_url)
    }
}
