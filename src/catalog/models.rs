//! Catalog records consumed by the download pipeline.

use serde::{Deserialize, Serialize};

/// The kind of entity a catalog URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Track,
    Album,
    Playlist,
    Artist,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Track => "track",
            CatalogKind::Album => "album",
            CatalogKind::Playlist => "playlist",
            CatalogKind::Artist => "artist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "track" => Some(CatalogKind::Track),
            "album" => Some(CatalogKind::Album),
            "playlist" => Some(CatalogKind::Playlist),
            "artist" => Some(CatalogKind::Artist),
            _ => None,
        }
    }
}

/// Everything the pipeline knows about a single track before downloading it.
///
/// Numeric fields use 0 for "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDescriptor {
    /// Catalog track id.
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    /// Release date, `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub release_date: String,
    pub track_number: u32,
    pub disc_number: u32,
    pub total_tracks: u32,
    pub total_discs: u32,
    pub cover_url: Option<String>,
    pub copyright: Option<String>,
    pub publisher: Option<String>,
    /// Catalog page URL of the track.
    pub source_url: Option<String>,
}

impl TrackDescriptor {
    /// Whether enough is known to compute the final filename up front.
    pub fn has_naming_info(&self) -> bool {
        !self.title.is_empty() && !self.artist.is_empty()
    }

    /// First four characters of the release date, if present.
    pub fn year(&self) -> &str {
        self.release_date.get(..4).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogAlbum {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub release_date: String,
    pub cover_url: Option<String>,
    pub tracks: Vec<TrackDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogPlaylist {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub cover_url: Option<String>,
    pub tracks: Vec<TrackDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistDiscography {
    pub id: String,
    pub name: String,
    pub albums: Vec<CatalogAlbum>,
}

/// A resolved catalog record, one variant per entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntity {
    Track(TrackDescriptor),
    Album(CatalogAlbum),
    Playlist(CatalogPlaylist),
    Artist(ArtistDiscography),
}

impl CatalogEntity {
    pub fn kind(&self) -> CatalogKind {
        match self {
            CatalogEntity::Track(_) => CatalogKind::Track,
            CatalogEntity::Album(_) => CatalogKind::Album,
            CatalogEntity::Playlist(_) => CatalogKind::Playlist,
            CatalogEntity::Artist(_) => CatalogKind::Artist,
        }
    }

    /// All tracks carried by this entity, in catalog order.
    pub fn tracks(&self) -> Vec<&TrackDescriptor> {
        match self {
            CatalogEntity::Track(track) => vec![track],
            CatalogEntity::Album(album) => album.tracks.iter().collect(),
            CatalogEntity::Playlist(playlist) => playlist.tracks.iter().collect(),
            CatalogEntity::Artist(artist) => artist
                .albums
                .iter()
                .flat_map(|album| album.tracks.iter())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> TrackDescriptor {
        TrackDescriptor {
            id: id.to_string(),
            title: format!("Title {}", id),
            artist: "Artist".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_catalog_kind_roundtrip() {
        for kind in [
            CatalogKind::Track,
            CatalogKind::Album,
            CatalogKind::Playlist,
            CatalogKind::Artist,
        ] {
            assert_eq!(CatalogKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CatalogKind::parse("episode"), None);
    }

    #[test]
    fn test_year_from_release_date() {
        let mut t = track("1");
        t.release_date = "2019-04-12".to_string();
        assert_eq!(t.year(), "2019");
        t.release_date = "20".to_string();
        assert_eq!(t.year(), "");
    }

    #[test]
    fn test_has_naming_info_requires_title_and_artist() {
        let mut t = track("1");
        assert!(t.has_naming_info());
        t.artist.clear();
        assert!(!t.has_naming_info());
    }

    #[test]
    fn test_entity_tracks_flattens_artist_albums() {
        let entity = CatalogEntity::Artist(ArtistDiscography {
            id: "a".to_string(),
            name: "Artist".to_string(),
            albums: vec![
                CatalogAlbum {
                    tracks: vec![track("1"), track("2")],
                    ..Default::default()
                },
                CatalogAlbum {
                    tracks: vec![track("3")],
                    ..Default::default()
                },
            ],
        });

        let ids: Vec<&str> = entity.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(entity.kind(), CatalogKind::Artist);
    }

    #[test]
    fn test_track_descriptor_deserializes_with_missing_fields() {
        let t: TrackDescriptor =
            serde_json::from_str(r#"{"id":"abc","title":"Song","track_number":3}"#).unwrap();
        assert_eq!(t.id, "abc");
        assert_eq!(t.track_number, 3);
        assert!(t.cover_url.is_none());
        assert!(t.album.is_empty());
    }
}
