//! Output filename rules and the "already downloaded" check.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::catalog::TrackDescriptor;

/// Extension of files produced by the delivery service.
pub const DOWNLOAD_EXTENSION: &str = "flac";

/// How downloaded files are named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilenameFormat {
    /// User template with `{title}`, `{artist}`, `{album}`, `{album_artist}`,
    /// `{year}`, `{disc}` and `{track}` placeholders.
    Template(String),
    /// `Artist - Title`
    ArtistTitle,
    /// `Title`
    Title,
    /// `Title - Artist`
    #[default]
    TitleArtist,
}

impl FilenameFormat {
    /// Anything containing a `{` is a template; unknown fixed names fall back
    /// to `Title - Artist`.
    pub fn parse(s: &str) -> Self {
        if s.contains('{') {
            return FilenameFormat::Template(s.to_string());
        }
        match s {
            "artist-title" => FilenameFormat::ArtistTitle,
            "title" => FilenameFormat::Title,
            _ => FilenameFormat::TitleArtist,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NamingOptions {
    pub format: FilenameFormat,
    /// Prefix fixed formats with a zero-padded position (`03. `).
    pub include_track_number: bool,
}

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("illegal chars regex is valid"))
}

fn track_placeholder_patterns() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"\{track\}\.\s*").expect("track regex is valid"),
            Regex::new(r"\{track\}\s*-\s*").expect("track regex is valid"),
            Regex::new(r"\{track\}\s*").expect("track regex is valid"),
        ]
    })
}

/// Strip characters that are illegal in file names on any supported platform.
pub fn sanitize_filename(name: &str) -> String {
    let stripped = illegal_chars().replace_all(name, "");
    stripped.trim().trim_end_matches('.').trim_end().to_string()
}

fn render_template(
    template: &str,
    track: &TrackDescriptor,
    position: Option<u32>,
) -> String {
    let mut name = template
        .replace("{title}", &sanitize_filename(&track.title))
        .replace("{artist}", &sanitize_filename(&track.artist))
        .replace("{album}", &sanitize_filename(&track.album))
        .replace("{album_artist}", &sanitize_filename(&track.album_artist))
        .replace("{year}", track.year());

    name = if track.disc_number > 0 {
        name.replace("{disc}", &track.disc_number.to_string())
    } else {
        name.replace("{disc}", "")
    };

    match position.filter(|p| *p > 0) {
        Some(p) => name.replace("{track}", &format!("{:02}", p)),
        None => {
            for pattern in track_placeholder_patterns() {
                name = pattern.replace_all(&name, "").into_owned();
            }
            name
        }
    }
}

/// Build the final filename (with extension) for a track.
///
/// `position` is the track's position in the download batch; it feeds the
/// `{track}` placeholder and the optional fixed-format prefix.
pub fn build_filename(
    track: &TrackDescriptor,
    options: &NamingOptions,
    position: Option<u32>,
) -> String {
    let title = sanitize_filename(&track.title);
    let artist = sanitize_filename(&track.artist);

    let stem = match &options.format {
        FilenameFormat::Template(template) => render_template(template, track, position),
        fixed => {
            let base = match fixed {
                FilenameFormat::ArtistTitle => format!("{} - {}", artist, title),
                FilenameFormat::Title => title,
                _ => format!("{} - {}", title, artist),
            };
            match position.filter(|p| *p > 0) {
                Some(p) if options.include_track_number => format!("{:02}. {}", p, base),
                _ => base,
            }
        }
    };

    format!("{}.{}", stem, DOWNLOAD_EXTENSION)
}

/// Full path the track will end up at inside `output_dir`.
pub fn expected_path(
    output_dir: &Path,
    track: &TrackDescriptor,
    options: &NamingOptions,
    position: Option<u32>,
) -> PathBuf {
    output_dir.join(build_filename(track, options, position))
}

/// Size of a non-empty file already present at `path`.
pub async fn existing_file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}
