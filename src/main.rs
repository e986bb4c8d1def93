use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunefetch::catalog::{CatalogApiClient, CatalogClient, CatalogEntity, TrackDescriptor};
use tunefetch::config::{AppConfig, CliConfig, FileConfig};
use tunefetch::converter::{audio_file_info, probe_audio_file, AudioConverter, ConvertRequest};
use tunefetch::downloader::{
    AcquisitionOutcome, CoverClient, DeliveryClient, DownloadRequest, SourceResolver,
    TrackDownloader, DEFAULT_QUALITY,
};
use tunefetch::history::{HistoryStore, SqliteHistoryStore};
use tunefetch::tagging::{LoftyTagCodec, TagCodec};
use tunefetch::tools::{ProvisioningSession, ToolLocation, ToolProvisioner, ToolState};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "Download, tag and convert music tracks")]
struct CliArgs {
    /// Path to a TOML config file. Values in it override command line flags.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the transcoder binaries and the history database.
    #[clap(long, global = true, value_parser = parse_path)]
    pub app_dir: Option<PathBuf>,

    /// Directory downloads are written to.
    #[clap(short, long, global = true, value_parser = parse_path)]
    pub output_dir: Option<PathBuf>,

    /// `title-artist`, `artist-title`, `title`, or a template such as
    /// `{track}. {artist} - {title}`.
    #[clap(long, global = true)]
    pub filename_format: Option<String>,

    /// Prefix fixed filename formats with the track position.
    #[clap(long, global = true)]
    pub include_track_number: bool,

    /// Embed the highest resolution cover available.
    #[clap(long, global = true)]
    pub max_quality_cover: bool,

    #[clap(long, global = true)]
    pub link_lookup_url: Option<String>,

    #[clap(long, global = true)]
    pub delivery_url: Option<String>,

    /// Catalog metadata service used by `download --catalog-url`.
    #[clap(long, global = true)]
    pub catalog_api_url: Option<String>,

    #[clap(long, global = true)]
    pub catalog_track_base: Option<String>,

    /// Timeout in seconds for every HTTP request.
    #[clap(long, global = true)]
    pub http_timeout_sec: Option<u64>,

    /// Do not record downloads in the history database.
    #[clap(long, global = true)]
    pub no_history: bool,

    #[command(subcommand)]
    command: Command,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            app_dir: self.app_dir.clone(),
            output_dir: self.output_dir.clone(),
            filename_format: self.filename_format.clone(),
            include_track_number: self.include_track_number,
            embed_max_quality_cover: self.max_quality_cover,
            link_lookup_url: self.link_lookup_url.clone(),
            delivery_url: self.delivery_url.clone(),
            catalog_api_url: self.catalog_api_url.clone(),
            catalog_track_base: self.catalog_track_base.clone(),
            http_timeout_sec: self.http_timeout_sec,
            no_history: self.no_history,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a track by id, or every track behind a catalog URL.
    Download(DownloadArgs),

    /// Convert audio files with ffmpeg, installing it first when missing.
    Convert {
        #[clap(required = true, value_parser = parse_path)]
        files: Vec<PathBuf>,

        /// Target format, e.g. mp3, m4a or flac.
        #[clap(long)]
        format: String,

        #[clap(long, default_value = "320k")]
        bitrate: String,

        /// For m4a: `alac` for lossless, otherwise aac.
        #[clap(long)]
        codec: Option<String>,
    },

    /// Show file facts and, when ffprobe is available, stream details.
    Info {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Inspect or install the transcoder.
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },

    /// Inspect the download history.
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Catalog track id.
    #[clap(required_unless_present = "catalog_url")]
    track_id: Option<String>,

    /// Catalog track, album, playlist or artist URL.
    #[clap(long, conflicts_with = "track_id")]
    catalog_url: Option<String>,

    #[clap(long)]
    title: Option<String>,
    #[clap(long)]
    artist: Option<String>,
    #[clap(long)]
    album: Option<String>,
    #[clap(long)]
    album_artist: Option<String>,
    #[clap(long)]
    release_date: Option<String>,
    #[clap(long, default_value_t = 0)]
    track_number: u32,
    #[clap(long, default_value_t = 0)]
    disc_number: u32,
    #[clap(long, default_value_t = 0)]
    total_tracks: u32,
    #[clap(long, default_value_t = 0)]
    total_discs: u32,
    #[clap(long)]
    cover_url: Option<String>,
    #[clap(long)]
    copyright: Option<String>,
    #[clap(long)]
    publisher: Option<String>,

    /// Position used for track-number prefixes.
    #[clap(long)]
    position: Option<u32>,

    #[clap(long, default_value = DEFAULT_QUALITY)]
    quality: String,
}

impl DownloadArgs {
    fn descriptor(&self, track_id: &str) -> TrackDescriptor {
        TrackDescriptor {
            id: track_id.to_string(),
            title: self.title.clone().unwrap_or_default(),
            artist: self.artist.clone().unwrap_or_default(),
            album: self.album.clone().unwrap_or_default(),
            album_artist: self.album_artist.clone().unwrap_or_default(),
            release_date: self.release_date.clone().unwrap_or_default(),
            track_number: self.track_number,
            disc_number: self.disc_number,
            total_tracks: self.total_tracks,
            total_discs: self.total_discs,
            cover_url: self.cover_url.clone(),
            copyright: self.copyright.clone(),
            publisher: self.publisher.clone(),
            source_url: None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Show where ffmpeg and ffprobe were found.
    Status,
    /// Download ffmpeg into the application directory.
    Install,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List downloads, newest first.
    List,
    /// Delete one entry.
    Delete { id: String },
    /// Delete every entry.
    Clear,
}

fn http_client(config: &AppConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_sec))
        .build()
        .context("Failed to create HTTP client")
}

fn open_history(config: &AppConfig) -> Result<SqliteHistoryStore> {
    info!("Opening history database at {:?}", config.history_db_path());
    SqliteHistoryStore::open(config.history_db_path())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

async fn run_download(config: &AppConfig, args: DownloadArgs) -> Result<()> {
    let client = http_client(config)?;
    let tags: Arc<dyn TagCodec> = Arc::new(LoftyTagCodec::new());

    let history = if config.history_enabled {
        Some(Arc::new(open_history(config)?))
    } else {
        None
    };

    let mut downloader = TrackDownloader::new(
        SourceResolver::new(
            client.clone(),
            config.link_lookup_url.clone(),
            config.catalog_track_base.clone(),
        ),
        DeliveryClient::new(client.clone(), config.delivery_url.clone()),
        CoverClient::new(client),
        tags,
    );
    if let Some(history) = &history {
        downloader = downloader.with_history(history.clone());
    }

    let jobs: Vec<(TrackDescriptor, Option<u32>)> = match &args.catalog_url {
        Some(url) => {
            let base = config
                .catalog_api_url
                .clone()
                .context("--catalog-url requires a catalog API (set catalog_api_url)")?;
            let catalog = CatalogApiClient::new(base, config.http_timeout_sec)
                .context("Failed to create catalog client")?;
            let entity = catalog.fetch(url).await?;
            info!(
                "Catalog {} with {} track(s)",
                entity.kind().as_str(),
                entity.tracks().len()
            );
            let single = matches!(entity, CatalogEntity::Track(_));
            entity
                .tracks()
                .into_iter()
                .enumerate()
                .map(|(i, track)| {
                    let position = if single {
                        Some(track.track_number).filter(|n| *n > 0)
                    } else {
                        Some(i as u32 + 1)
                    };
                    (track.clone(), position)
                })
                .collect()
        }
        None => {
            let track_id = args.track_id.clone().unwrap_or_default();
            let position = args
                .position
                .or(Some(args.track_number).filter(|n| *n > 0));
            vec![(args.descriptor(&track_id), position)]
        }
    };

    let mut failures = 0;
    for (track, position) in jobs {
        let request = DownloadRequest {
            output_dir: config.output_dir.clone(),
            quality: args.quality.clone(),
            naming: config.naming.clone(),
            position,
            embed_max_quality_cover: config.embed_max_quality_cover,
            track,
        };

        let bar = spinner(&format!("Downloading {}", request.track.id))?;
        let counter = downloader.progress_counter();
        let ticker_bar = bar.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(200));
            loop {
                interval.tick().await;
                let bytes = counter.load(std::sync::atomic::Ordering::Relaxed);
                ticker_bar.set_message(format!(
                    "Downloading ({:.2} MB)",
                    bytes as f64 / (1024.0 * 1024.0)
                ));
            }
        });

        let result = downloader.download_by_track_id(&request).await;
        ticker.abort();

        match result {
            Ok(AcquisitionOutcome::Downloaded(path)) => {
                bar.finish_with_message(format!("Downloaded {}", path.display()));
            }
            Ok(AcquisitionOutcome::AlreadyExists(path)) => {
                bar.finish_with_message(format!("Already exists {}", path.display()));
            }
            Err(e) => {
                bar.finish_with_message(format!("Failed {}: {}", request.track.id, e));
                error!("Failed to download {}: {}", request.track.id, e);
                failures += 1;
            }
        }
    }

    drop(downloader);
    if let Some(history) = history {
        match Arc::try_unwrap(history) {
            Ok(store) => store.close()?,
            Err(_) => warn!("History store still in use at shutdown"),
        }
    }

    if failures > 0 {
        bail!("{} download(s) failed", failures);
    }
    Ok(())
}

async fn install_tools(provisioner: &ToolProvisioner) -> Result<()> {
    let session = ProvisioningSession::new();
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos:>3}% {msg}")?,
    );

    let result = provisioner
        .provision(&session, |percent| {
            bar.set_position(percent as u64);
            bar.set_message(format!(
                "{:.2} MB, {:.2} MB/s",
                session.bytes_downloaded() as f64 / (1024.0 * 1024.0),
                session.speed_mbps()
            ));
        })
        .await;

    match result {
        Ok(()) => {
            bar.finish_with_message("installed");
            Ok(())
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            Err(e).context("Failed to install ffmpeg")
        }
    }
}

fn describe(label: &str, state: &ToolState) {
    let location = match state.location {
        ToolLocation::Local => "installed",
        ToolLocation::SearchPath => "on PATH",
        ToolLocation::Missing => "missing",
    };
    println!(
        "{:<8} {:<10} runnable={} {}",
        label,
        location,
        state.runnable,
        state.path.display()
    );
}

async fn run_convert(config: &AppConfig, request: ConvertRequest) -> Result<()> {
    let provisioner = ToolProvisioner::new(config.tools_dir(), http_client(config)?)?;
    if !provisioner.is_transcoder_installed().await {
        info!("ffmpeg not found, installing into {:?}", config.tools_dir());
        install_tools(&provisioner).await?;
    }

    let converter = AudioConverter::new(provisioner.ffmpeg_path(), Arc::new(LoftyTagCodec::new()));
    let results = converter.convert_batch(&request).await?;

    let mut failures = 0;
    for result in &results {
        if result.success {
            let output = result
                .output_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("OK     {} -> {}", result.input_file.display(), output);
        } else {
            failures += 1;
            println!(
                "FAILED {}: {}",
                result.input_file.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if failures > 0 {
        bail!("{} of {} conversion(s) failed", failures, results.len());
    }
    Ok(())
}

async fn run_info(config: &AppConfig, file: PathBuf) -> Result<()> {
    let info = audio_file_info(&file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    let provisioner = ToolProvisioner::new(config.tools_dir(), http_client(config)?)?;
    match provisioner.ffprobe_path() {
        Ok(ffprobe) => {
            let stream = probe_audio_file(&ffprobe, &file).await?;
            println!(
                "codec={} duration_ms={} bitrate={:?} sample_rate={:?} channels={:?} container={}",
                stream.codec,
                stream.duration_ms,
                stream.bitrate,
                stream.sample_rate,
                stream.channels,
                stream.container
            );
        }
        Err(e) => warn!("Skipping stream details: {}", e),
    }
    Ok(())
}

fn run_history(config: &AppConfig, command: HistoryCommand) -> Result<()> {
    let store = open_history(config)?;
    match command {
        HistoryCommand::List => {
            let items = store.list()?;
            if items.is_empty() {
                println!("No downloads recorded");
            }
            for item in items {
                let when = chrono::DateTime::from_timestamp_millis(item.timestamp)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {} - {}  [{} {}]  {}",
                    item.id, when, item.artists, item.title, item.quality, item.format, item.path
                );
            }
        }
        HistoryCommand::Delete { id } => {
            if !store.delete(&id)? {
                bail!("No history entry with id {}", id);
            }
            println!("Deleted {}", id);
        }
        HistoryCommand::Clear => {
            store.clear()?;
            println!("History cleared");
        }
    }
    store.close()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    match cli_args.command {
        Command::Download(args) => run_download(&config, args).await,
        Command::Convert {
            files,
            format,
            bitrate,
            codec,
        } => {
            let request = ConvertRequest {
                input_files: files,
                output_format: format,
                bitrate,
                codec,
            };
            run_convert(&config, request).await
        }
        Command::Info { file } => run_info(&config, file).await,
        Command::Tools { command } => {
            let provisioner = ToolProvisioner::new(config.tools_dir(), http_client(&config)?)?;
            match command {
                ToolsCommand::Status => {
                    let status = provisioner.status().await;
                    describe("ffmpeg", &status.transcoder);
                    describe("ffprobe", &status.probe);
                    Ok(())
                }
                ToolsCommand::Install => install_tools(&provisioner).await,
            }
        }
        Command::History { command } => run_history(&config, command),
    }
}
