//! Wires config-selected collaborators into a [`PipelineOrchestrator`].

use anyhow::{Context, Result};
use bundle_relay_core::PipelineOrchestrator;
use tracing::info;

use crate::archive::ZipArchiver;
use crate::fetch::{HttpFetcher, LocalFileFetcher, SourceFetcher};
use crate::load_config::{RelayConfig, SourceSection, UploadSection};
use crate::locate::{DirectoryLocator, HttpManifestLocator, SourceLocator};
use crate::upload::{DirectoryUploader, HttpObjectStoreUploader, ObjectStore};

/// The orchestrator as assembled by the CLI.
pub type Relay = PipelineOrchestrator<SourceLocator, SourceFetcher, ZipArchiver, ObjectStore>;

/// Build the locator/fetcher pair for a source section.
pub fn build_source(
    source: &SourceSection,
    client: &reqwest::Client,
) -> (SourceLocator, SourceFetcher) {
    match source {
        SourceSection::Local {
            root,
            recursive,
            max_file_bytes,
        } => (
            SourceLocator::Directory(DirectoryLocator::new(root).with_recursive(*recursive)),
            SourceFetcher::Local(LocalFileFetcher::new(root).with_max_file_bytes(*max_file_bytes)),
        ),
        SourceSection::Http {
            base_url,
            manifest_path,
            max_file_bytes,
        } => (
            SourceLocator::Http(HttpManifestLocator::new(
                client.clone(),
                base_url,
                manifest_path,
            )),
            SourceFetcher::Http(
                HttpFetcher::new(client.clone(), base_url).with_max_file_bytes(*max_file_bytes),
            ),
        ),
    }
}

pub fn build_store(upload: &UploadSection, client: &reqwest::Client) -> ObjectStore {
    match upload {
        UploadSection::Directory { root, bucket, .. } => {
            ObjectStore::Directory(DirectoryUploader::new(root, bucket))
        }
        UploadSection::Http {
            endpoint,
            bucket,
            token,
            ..
        } => ObjectStore::Http(HttpObjectStoreUploader::new(
            client.clone(),
            endpoint,
            bucket,
            token.clone(),
        )),
    }
}

pub fn build_relay(config: &RelayConfig) -> Result<Relay> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("bundle-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let (locator, fetcher) = build_source(&config.source, &client);
    let archiver = ZipArchiver::new(config.archive.compression)
        .with_max_total_bytes(config.archive.max_total_bytes);
    let store = build_store(&config.upload, &client);

    info!(
        bucket = config.upload.bucket(),
        destination = config.upload.object_name(),
        "Relay assembled"
    );
    Ok(PipelineOrchestrator::new(
        config.pipeline_config(),
        locator,
        fetcher,
        archiver,
        store,
    ))
}
