//! End-to-end tests for installing the transcoder from stub archives.

#![cfg(unix)]

mod common;

use common::{tar_xz_bytes, zip_bytes, StubServer, StubState, FAKE_FFMPEG_SCRIPT};
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;
use tunefetch::tools::{
    ArchiveError, ArchiveKind, Platform, ProvisioningSession, ToolError, ToolLocation,
    ToolProvisioner, ToolSource, ToolSources,
};

const FAKE_FFPROBE_SCRIPT: &str = "#!/bin/sh\necho ffprobe version test\n";

async fn server_with(files: Vec<(&str, Vec<u8>)>) -> StubServer {
    let files: HashMap<String, Vec<u8>> = files
        .into_iter()
        .map(|(name, bytes)| (name.to_string(), bytes))
        .collect();
    StubServer::spawn(move |_| StubState {
        files,
        ..Default::default()
    })
    .await
}

fn source(server: &StubServer, name: &str, kind: ArchiveKind) -> ToolSource {
    ToolSource {
        url: server.url(&format!("/files/{}", name)),
        kind,
    }
}

#[tokio::test]
async fn test_provision_from_zip() {
    let archive = zip_bytes(&[
        ("ffmpeg-master/bin/ffmpeg", FAKE_FFMPEG_SCRIPT, 0o644),
        ("ffmpeg-master/bin/ffprobe", FAKE_FFPROBE_SCRIPT, 0o644),
        ("ffmpeg-master/LICENSE.txt", "GPL", 0o644),
    ]);
    let server = server_with(vec![("tools.zip", archive)]).await;
    let dir = TempDir::new().unwrap();
    let install_dir = dir.path().join("bin");

    let provisioner = ToolProvisioner::with_sources(
        install_dir.clone(),
        Platform::Linux,
        ToolSources {
            transcoder: source(&server, "tools.zip", ArchiveKind::Zip),
            probe: None,
        },
        common::http_client(),
    );

    let session = ProvisioningSession::new();
    let reported = Mutex::new(Vec::new());
    provisioner
        .provision(&session, |p| reported.lock().unwrap().push(p))
        .await
        .unwrap();

    assert!(install_dir.join("ffmpeg").is_file());
    assert!(install_dir.join("ffprobe").is_file());
    assert!(!install_dir.join("LICENSE.txt").exists());
    // Staging archive is gone.
    let leftovers: Vec<_> = std::fs::read_dir(&install_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("tool-download-"))
        .collect();
    assert!(leftovers.is_empty(), "leftover staging files: {:?}", leftovers);

    let status = provisioner.status().await;
    assert_eq!(status.transcoder.location, ToolLocation::Local);
    assert!(status.transcoder.runnable);
    assert_eq!(status.probe.location, ToolLocation::Local);
    assert_eq!(provisioner.ffprobe_path().unwrap(), install_dir.join("ffprobe"));

    let reported = reported.into_inner().unwrap();
    assert_eq!(reported.first(), Some(&0));
    assert_eq!(reported.last(), Some(&100));
    assert!(reported.windows(2).all(|w| w[0] <= w[1]));

    assert!(!session.is_downloading());
    assert_eq!(session.bytes_downloaded(), 0);
}

#[tokio::test]
async fn test_provision_from_tar_xz() {
    let archive = tar_xz_bytes(&[
        ("ffmpeg-master-latest-linux64-gpl/bin/ffmpeg", FAKE_FFMPEG_SCRIPT),
        ("ffmpeg-master-latest-linux64-gpl/bin/ffprobe", FAKE_FFPROBE_SCRIPT),
    ]);
    let server = server_with(vec![("ffmpeg.tar.xz", archive)]).await;
    let dir = TempDir::new().unwrap();

    let provisioner = ToolProvisioner::with_sources(
        dir.path().to_path_buf(),
        Platform::Linux,
        ToolSources {
            transcoder: ToolSource::new(server.url("/files/ffmpeg.tar.xz"), Platform::Linux),
            probe: None,
        },
        common::http_client(),
    );

    provisioner
        .provision(&ProvisioningSession::new(), |_| {})
        .await
        .unwrap();

    assert!(provisioner.is_transcoder_installed().await);
    assert_eq!(provisioner.ffmpeg_path(), dir.path().join("ffmpeg"));
}

#[tokio::test]
async fn test_provision_two_archives_spans_full_range() {
    let server = server_with(vec![
        (
            "ffmpeg.zip",
            zip_bytes(&[("ffmpeg", FAKE_FFMPEG_SCRIPT, 0o755)]),
        ),
        (
            "ffprobe.zip",
            zip_bytes(&[("ffprobe", FAKE_FFPROBE_SCRIPT, 0o755)]),
        ),
    ])
    .await;
    let dir = TempDir::new().unwrap();

    let provisioner = ToolProvisioner::with_sources(
        dir.path().to_path_buf(),
        Platform::MacOs,
        ToolSources {
            transcoder: source(&server, "ffmpeg.zip", ArchiveKind::Zip),
            probe: Some(source(&server, "ffprobe.zip", ArchiveKind::Zip)),
        },
        common::http_client(),
    );

    let reported = Mutex::new(Vec::new());
    provisioner
        .provision(&ProvisioningSession::new(), |p| {
            reported.lock().unwrap().push(p)
        })
        .await
        .unwrap();

    let reported = reported.into_inner().unwrap();
    assert!(reported.contains(&50));
    assert_eq!(reported.last(), Some(&100));
    assert!(reported.windows(2).all(|w| w[0] <= w[1]));
    assert!(dir.path().join("ffmpeg").is_file());
    assert!(dir.path().join("ffprobe").is_file());
}

#[tokio::test]
async fn test_provision_only_missing_companion() {
    let server = server_with(vec![(
        "ffprobe.zip",
        zip_bytes(&[("ffprobe", FAKE_FFPROBE_SCRIPT, 0o755)]),
    )])
    .await;
    let dir = TempDir::new().unwrap();
    common::install_fake_ffmpeg(dir.path());

    let provisioner = ToolProvisioner::with_sources(
        dir.path().to_path_buf(),
        Platform::MacOs,
        ToolSources {
            // Would 404 if it were fetched.
            transcoder: source(&server, "ffmpeg.zip", ArchiveKind::Zip),
            probe: Some(source(&server, "ffprobe.zip", ArchiveKind::Zip)),
        },
        common::http_client(),
    );

    provisioner
        .provision(&ProvisioningSession::new(), |_| {})
        .await
        .unwrap();

    assert!(dir.path().join("ffprobe").is_file());
}

#[tokio::test]
async fn test_archive_without_executables_fails() {
    let server = server_with(vec![(
        "empty.zip",
        zip_bytes(&[("README.md", "nothing", 0o644)]),
    )])
    .await;
    let dir = TempDir::new().unwrap();

    let provisioner = ToolProvisioner::with_sources(
        dir.path().to_path_buf(),
        Platform::Linux,
        ToolSources {
            transcoder: source(&server, "empty.zip", ArchiveKind::Zip),
            probe: None,
        },
        common::http_client(),
    );

    let session = ProvisioningSession::new();
    let err = provisioner.provision(&session, |_| {}).await.unwrap_err();

    assert!(matches!(
        err,
        ToolError::ArchiveExtraction(ArchiveError::NoExecutableFound(_, _))
    ));
    assert!(!session.is_downloading());
    assert!(!provisioner.is_transcoder_installed().await);
}

#[tokio::test]
async fn test_probe_only_archive_is_not_an_install() {
    let server = server_with(vec![(
        "probe.zip",
        zip_bytes(&[("bin/ffprobe", FAKE_FFPROBE_SCRIPT, 0o755)]),
    )])
    .await;
    let dir = TempDir::new().unwrap();

    let provisioner = ToolProvisioner::with_sources(
        dir.path().to_path_buf(),
        Platform::Linux,
        ToolSources {
            transcoder: source(&server, "probe.zip", ArchiveKind::Zip),
            probe: None,
        },
        common::http_client(),
    );

    let err = provisioner
        .provision(&ProvisioningSession::new(), |_| {})
        .await
        .unwrap_err();

    // Extraction itself succeeded partially; the install is still incomplete.
    assert!(matches!(err, ToolError::Download(_)));
    assert!(dir.path().join("ffprobe").is_file());
}

#[tokio::test]
async fn test_download_http_error() {
    let server = server_with(vec![]).await;
    let dir = TempDir::new().unwrap();

    let provisioner = ToolProvisioner::with_sources(
        dir.path().to_path_buf(),
        Platform::Linux,
        ToolSources {
            transcoder: source(&server, "missing.zip", ArchiveKind::Zip),
            probe: None,
        },
        common::http_client(),
    );

    assert!(matches!(
        provisioner
            .provision(&ProvisioningSession::new(), |_| {})
            .await,
        Err(ToolError::Download(_))
    ));
}
