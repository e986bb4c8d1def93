mod file_config;

pub use file_config::{FileConfig, NamingConfig, ServicesConfig};

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::downloader::{
    FilenameFormat, NamingOptions, DEFAULT_CATALOG_TRACK_BASE, DEFAULT_DELIVERY_URL,
    DEFAULT_LINK_LOOKUP_URL,
};
use crate::obfuscated;

const APP_DIR_NAME: &str = ".tunefetch";
pub const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 120;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub app_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub filename_format: Option<String>,
    pub include_track_number: bool,
    pub embed_max_quality_cover: bool,
    pub link_lookup_url: Option<String>,
    pub delivery_url: Option<String>,
    pub catalog_api_url: Option<String>,
    pub catalog_track_base: Option<String>,
    pub http_timeout_sec: Option<u64>,
    pub no_history: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_dir: PathBuf,
    pub output_dir: PathBuf,
    pub naming: NamingOptions,
    pub embed_max_quality_cover: bool,
    pub link_lookup_url: String,
    pub delivery_url: String,
    pub catalog_api_url: Option<String>,
    pub catalog_track_base: String,
    pub http_timeout_sec: u64,
    pub history_enabled: bool,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let naming_file = file.naming.unwrap_or_default();
        let services = file.services.unwrap_or_default();

        let app_dir = match file.app_dir.map(PathBuf::from).or_else(|| cli.app_dir.clone()) {
            Some(dir) => dir,
            None => dirs::home_dir()
                .map(|home| home.join(APP_DIR_NAME))
                .context("Cannot determine home directory; set app_dir")?,
        };
        if app_dir.exists() && !app_dir.is_dir() {
            bail!("app_dir is not a directory: {:?}", app_dir);
        }

        let output_dir = file
            .output_dir
            .map(PathBuf::from)
            .or_else(|| cli.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        if output_dir.exists() && !output_dir.is_dir() {
            bail!("output_dir is not a directory: {:?}", output_dir);
        }

        let filename_format = naming_file
            .filename_format
            .or_else(|| cli.filename_format.clone())
            .map(|f| FilenameFormat::parse(&f))
            .unwrap_or_default();
        let naming = NamingOptions {
            format: filename_format,
            include_track_number: naming_file
                .include_track_number
                .unwrap_or(cli.include_track_number),
        };
        let embed_max_quality_cover = naming_file
            .embed_max_quality_cover
            .unwrap_or(cli.embed_max_quality_cover);

        let link_lookup_url = services
            .link_lookup_url
            .or_else(|| cli.link_lookup_url.clone())
            .unwrap_or_else(|| DEFAULT_LINK_LOOKUP_URL.to_string());
        let delivery_url = match services.delivery_url.or_else(|| cli.delivery_url.clone()) {
            Some(url) => url,
            None => obfuscated::decode(DEFAULT_DELIVERY_URL)
                .context("Failed to decode default delivery URL")?,
        };
        let catalog_api_url = services
            .catalog_api_url
            .or_else(|| cli.catalog_api_url.clone());
        let catalog_track_base = services
            .catalog_track_base
            .or_else(|| cli.catalog_track_base.clone())
            .unwrap_or_else(|| DEFAULT_CATALOG_TRACK_BASE.to_string());

        let http_timeout_sec = file
            .http_timeout_sec
            .or(cli.http_timeout_sec)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SEC);
        if http_timeout_sec == 0 {
            bail!("http_timeout_sec must be greater than zero");
        }

        let history_enabled = file.history_enabled.unwrap_or(!cli.no_history);

        Ok(Self {
            app_dir,
            output_dir,
            naming,
            embed_max_quality_cover,
            link_lookup_url,
            delivery_url,
            catalog_api_url,
            catalog_track_base,
            http_timeout_sec,
            history_enabled,
        })
    }

    /// Directory holding the provisioned transcoder binaries.
    pub fn tools_dir(&self) -> PathBuf {
        self.app_dir.join("bin")
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.app_dir.join("history.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            app_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.naming.format, FilenameFormat::TitleArtist);
        assert!(!config.naming.include_track_number);
        assert_eq!(config.link_lookup_url, DEFAULT_LINK_LOOKUP_URL);
        assert_eq!(config.delivery_url, "https://amazon.afkarxyz.fun");
        assert_eq!(config.catalog_track_base, DEFAULT_CATALOG_TRACK_BASE);
        assert!(config.catalog_api_url.is_none());
        assert_eq!(config.http_timeout_sec, DEFAULT_HTTP_TIMEOUT_SEC);
        assert!(config.history_enabled);
        assert_eq!(config.tools_dir(), temp_dir.path().join("bin"));
        assert_eq!(config.history_db_path(), temp_dir.path().join("history.db"));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            app_dir: Some(PathBuf::from("/should/be/overridden")),
            output_dir: Some(PathBuf::from("/cli/out")),
            filename_format: Some("title".to_string()),
            include_track_number: false,
            http_timeout_sec: Some(60),
            delivery_url: Some("http://cli-delivery".to_string()),
            ..Default::default()
        };

        let file_config = FileConfig {
            app_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            naming: Some(NamingConfig {
                filename_format: Some("artist-title".to_string()),
                include_track_number: Some(true),
                ..Default::default()
            }),
            history_enabled: Some(false),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.app_dir, temp_dir.path());
        assert_eq!(config.naming.format, FilenameFormat::ArtistTitle);
        assert!(config.naming.include_track_number);
        assert!(!config.history_enabled);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.output_dir, PathBuf::from("/cli/out"));
        assert_eq!(config.http_timeout_sec, 60);
        assert_eq!(config.delivery_url, "http://cli-delivery");
    }

    #[test]
    fn test_resolve_template_format() {
        let cli = CliConfig {
            app_dir: Some(TempDir::new().unwrap().path().to_path_buf()),
            filename_format: Some("{track} - {title}".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(
            config.naming.format,
            FilenameFormat::Template("{track} - {title}".to_string())
        );
    }

    #[test]
    fn test_resolve_no_history_flag() {
        let cli = CliConfig {
            app_dir: Some(PathBuf::from("/tmp/tunefetch-test-app")),
            no_history: true,
            ..Default::default()
        };
        assert!(!AppConfig::resolve(&cli, None).unwrap().history_enabled);
    }

    #[test]
    fn test_resolve_zero_timeout_error() {
        let cli = CliConfig {
            app_dir: Some(PathBuf::from("/tmp/tunefetch-test-app")),
            http_timeout_sec: Some(0),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("http_timeout_sec"));
    }

    #[test]
    fn test_resolve_output_dir_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            app_dir: Some(PathBuf::from("/tmp/tunefetch-test-app")),
            output_dir: Some(temp_file.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }
}
