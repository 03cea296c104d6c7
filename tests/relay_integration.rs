use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use bundle_relay::archive::{Compression, ZipArchiver};
use bundle_relay::fetch::LocalFileFetcher;
use bundle_relay::load_config::parse_config;
use bundle_relay::locate::DirectoryLocator;
use bundle_relay::relay::build_relay;
use bundle_relay::upload::DirectoryUploader;
use bundle_relay_core::{
    CancellationToken, PipelineConfig, PipelineError, PipelineOrchestrator, PipelineState,
};
use tempfile::tempdir;

fn seed_remote(root: &Path) {
    fs::create_dir_all(root.join("remote/path")).unwrap();
    for name in ["file1.txt", "file2.txt", "file3.txt"] {
        let handle = format!("remote/path/{name}");
        fs::write(root.join(&handle), format!("Data of {handle}")).unwrap();
    }
    fs::write(root.join("remote/path/notes.md"), "not selected").unwrap();
}

fn zip_entries(bytes: &[u8]) -> Vec<(String, String)> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).unwrap();
            let mut content = String::new();
            file.read_to_string(&mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

fn local_config(source: &Path, out: &Path) -> String {
    format!(
        "source:\n  type: local\n  root: {}\nupload:\n  type: directory\n  root: {}\n",
        source.display(),
        out.display()
    )
}

#[tokio::test]
async fn test_relay_zips_matching_files_into_bucket() {
    let source = tempdir().unwrap();
    let out = tempdir().unwrap();
    seed_remote(source.path());

    let config = parse_config(&local_config(source.path(), out.path())).unwrap();
    let relay = build_relay(&config).unwrap();

    let report = relay
        .execute(r"file\d\.txt$", &CancellationToken::new(), None)
        .await
        .expect("relay should succeed");

    assert_eq!(report.handles.len(), 3);
    assert!(report
        .object_id
        .as_str()
        .starts_with("my-bucket/result.zip@"));

    let stored = fs::read(out.path().join("my-bucket/result.zip")).unwrap();
    assert_eq!(stored.len(), report.archive_bytes);
    assert_eq!(
        zip_entries(&stored),
        vec![
            (
                "remote/path/file1.txt".to_string(),
                "Data of remote/path/file1.txt".to_string()
            ),
            (
                "remote/path/file2.txt".to_string(),
                "Data of remote/path/file2.txt".to_string()
            ),
            (
                "remote/path/file3.txt".to_string(),
                "Data of remote/path/file3.txt".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_rerunning_with_same_data_produces_same_archive() {
    let source = tempdir().unwrap();
    let out = tempdir().unwrap();
    seed_remote(source.path());

    let config = parse_config(&local_config(source.path(), out.path())).unwrap();
    let relay = build_relay(&config).unwrap();

    let first = relay.run(r"\.txt$").await.unwrap();
    let first_bytes = fs::read(out.path().join("my-bucket/result.zip")).unwrap();
    let second = relay.run(r"\.txt$").await.unwrap();
    let second_bytes = fs::read(out.path().join("my-bucket/result.zip")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn test_relay_without_matches_uploads_nothing() {
    let source = tempdir().unwrap();
    let out = tempdir().unwrap();
    seed_remote(source.path());

    let relay = PipelineOrchestrator::new(
        PipelineConfig::default(),
        DirectoryLocator::new(source.path()),
        LocalFileFetcher::new(source.path()),
        ZipArchiver::new(Compression::Deflated),
        DirectoryUploader::new(out.path(), "my-bucket"),
    );

    let err = relay.run(r"\.pdf$").await.unwrap_err();
    assert!(matches!(err, PipelineError::NoFilesFound { .. }), "got {err:?}");
    assert!(!out.path().join("my-bucket").exists());
}

#[tokio::test]
async fn test_oversized_file_fails_fetch_and_uploads_nothing() {
    let source = tempdir().unwrap();
    let out = tempdir().unwrap();
    seed_remote(source.path());
    fs::write(source.path().join("remote/path/file9.txt"), vec![b'x'; 4096]).unwrap();

    let relay = PipelineOrchestrator::new(
        PipelineConfig {
            max_concurrent_fetches: Some(2),
            ..PipelineConfig::default()
        },
        DirectoryLocator::new(source.path()),
        LocalFileFetcher::new(source.path()).with_max_file_bytes(Some(1024)),
        ZipArchiver::default(),
        DirectoryUploader::new(out.path(), "my-bucket"),
    );

    let err = relay.run(r"file\d\.txt$").await.unwrap_err();
    match &err {
        PipelineError::FetchFailed { handle, .. } => {
            assert_eq!(handle.as_str(), "remote/path/file9.txt")
        }
        other => panic!("expected FetchFailed, got {other:?}"),
    }
    assert_eq!(err.stage(), PipelineState::Fetching);
    assert!(!out.path().join("my-bucket/result.zip").exists());
}

#[tokio::test]
async fn test_archive_limit_fails_before_upload() {
    let source = tempdir().unwrap();
    let out = tempdir().unwrap();
    seed_remote(source.path());

    let relay = PipelineOrchestrator::new(
        PipelineConfig::default(),
        DirectoryLocator::new(source.path()),
        LocalFileFetcher::new(source.path()),
        ZipArchiver::default().with_max_total_bytes(Some(10)),
        DirectoryUploader::new(out.path(), "my-bucket"),
    );

    let err = relay.run(r"\.txt$").await.unwrap_err();
    assert!(matches!(err, PipelineError::ArchiveFailed { files: 3, .. }), "got {err:?}");
    assert!(!out.path().join("my-bucket/result.zip").exists());
}
