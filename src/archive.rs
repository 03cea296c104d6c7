//! Zip archiver.
//!
//! Entries are named after their handle and written in handle order with a fixed
//! timestamp, so the archive bytes depend only on payload content, never on the
//! order fetches happened to complete in.

use std::io::{Cursor, Write};

use async_trait::async_trait;
use bundle_relay_core::contract::{ArchiveError, ArchivePayload, Archiver, PayloadCollection};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl From<Compression> for CompressionMethod {
    fn from(c: Compression) -> Self {
        match c {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveFailure {
    #[error("Nothing to archive")]
    Empty,

    #[error("Payloads total {total} bytes, over the {limit} byte archive limit")]
    TooLarge { total: u64, limit: u64 },

    #[error("Two payloads map to the same archive entry {name:?}")]
    DuplicateEntry { name: String },

    #[error("Failed to write zip archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write archive entry")]
    Io(#[from] std::io::Error),

    #[error("Archive task failed")]
    Task(#[from] tokio::task::JoinError),
}

fn entry_name(handle: &str) -> String {
    handle.trim_start_matches('/').to_string()
}

#[derive(Debug, Clone, Default)]
pub struct ZipArchiver {
    compression: Compression,
    max_total_bytes: Option<u64>,
}

impl ZipArchiver {
    pub fn new(compression: Compression) -> Self {
        Self {
            compression,
            max_total_bytes: None,
        }
    }

    pub fn with_max_total_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_total_bytes = limit;
        self
    }

    /// Build the archive synchronously.
    pub fn build(&self, payloads: PayloadCollection) -> Result<ArchivePayload, ArchiveFailure> {
        if payloads.is_empty() {
            return Err(ArchiveFailure::Empty);
        }
        let total: u64 = payloads.iter().map(|p| p.len() as u64).sum();
        if let Some(limit) = self.max_total_bytes {
            if total > limit {
                return Err(ArchiveFailure::TooLarge { total, limit });
            }
        }

        let mut entries: Vec<(String, Vec<u8>)> = payloads
            .into_iter()
            .map(|p| (entry_name(p.handle.as_str()), p.content))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(ArchiveFailure::DuplicateEntry {
                name: pair[0].0.clone(),
            });
        }

        let options = FileOptions::default()
            .compression_method(self.compression.into())
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in &entries {
            debug!(entry = %name, bytes = content.len(), "Adding archive entry");
            writer.start_file(name.as_str(), options)?;
            writer.write_all(content)?;
        }
        let bytes = writer.finish()?.into_inner();

        info!(
            entries = entries.len(),
            input_bytes = total,
            archive_bytes = bytes.len(),
            "Zip archive built"
        );
        Ok(ArchivePayload::new(bytes))
    }
}

#[async_trait]
impl Archiver for ZipArchiver {
    async fn archive(&self, payloads: PayloadCollection) -> Result<ArchivePayload, ArchiveError> {
        let archiver = self.clone();
        let archive = tokio::task::spawn_blocking(move || archiver.build(payloads))
            .await
            .map_err(ArchiveFailure::from)??;
        Ok(archive)
    }
}
