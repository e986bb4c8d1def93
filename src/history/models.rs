use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::TrackDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub track_id: String,
    pub title: String,
    pub artists: String,
    pub album: String,
    pub cover_url: String,
    pub quality: String,
    pub format: String,
    pub path: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

impl HistoryItem {
    pub fn for_download(track: &TrackDescriptor, quality: &str, path: &Path) -> Self {
        let format = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_uppercase())
            .unwrap_or_default();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            track_id: track.id.clone(),
            title: track.title.clone(),
            artists: track.artist.clone(),
            album: track.album.clone(),
            cover_url: track.cover_url.clone().unwrap_or_default(),
            quality: quality.to_string(),
            format,
            path: path.to_string_lossy().into_owned(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
