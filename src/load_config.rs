//! `load_config` module: loads a static YAML config and injects secrets from the environment.
//!
//! This is the only place where user-supplied YAML is parsed and mapped to typed
//! settings for the locator, fetcher, archiver and uploader.
//!
//! # Responsibilities
//! - Parse the YAML file into [`RelayConfig`]
//! - Fill in defaults (bucket `my-bucket`, object name `result.zip`, deflate compression)
//! - Inject secrets from the environment: `OBJECT_STORE_TOKEN` for the HTTP uploader
//! - Reject settings the pipeline cannot run with, with messages naming the field
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use bundle_relay_core::PipelineConfig;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::archive::Compression;
use crate::locate::DEFAULT_MANIFEST_PATH;
use crate::upload::DEFAULT_BUCKET;

/// Environment variable holding the bearer token for the HTTP uploader.
pub const OBJECT_STORE_TOKEN_ENV: &str = "OBJECT_STORE_TOKEN";

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub source: SourceSection,
    #[serde(default)]
    pub archive: ArchiveSection,
    pub upload: UploadSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// Where files are searched for and read from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSection {
    Local {
        root: PathBuf,
        #[serde(default = "default_recursive")]
        recursive: bool,
        #[serde(default)]
        max_file_bytes: Option<u64>,
    },
    Http {
        base_url: String,
        #[serde(default = "default_manifest_path")]
        manifest_path: String,
        #[serde(default)]
        max_file_bytes: Option<u64>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveSection {
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub max_total_bytes: Option<u64>,
}

/// Where the archive is stored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UploadSection {
    Directory {
        root: PathBuf,
        #[serde(default = "default_bucket")]
        bucket: String,
        #[serde(default = "default_object_name")]
        object_name: String,
    },
    Http {
        endpoint: String,
        #[serde(default = "default_bucket")]
        bucket: String,
        #[serde(default = "default_object_name")]
        object_name: String,
        /// Injected from the environment, never read from the file.
        #[serde(skip)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub max_concurrent_fetches: Option<usize>,
}

fn default_recursive() -> bool {
    true
}

fn default_manifest_path() -> String {
    DEFAULT_MANIFEST_PATH.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_object_name() -> String {
    bundle_relay_core::DEFAULT_DESTINATION.to_string()
}

impl UploadSection {
    pub fn bucket(&self) -> &str {
        match self {
            UploadSection::Directory { bucket, .. } | UploadSection::Http { bucket, .. } => bucket,
        }
    }

    pub fn object_name(&self) -> &str {
        match self {
            UploadSection::Directory { object_name, .. }
            | UploadSection::Http { object_name, .. } => object_name,
        }
    }
}

impl RelayConfig {
    /// Orchestrator settings derived from this config.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            destination: self.upload.object_name().to_string(),
            max_concurrent_fetches: self.pipeline.max_concurrent_fetches,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            source = ?self.source,
            bucket = self.upload.bucket(),
            object_name = self.upload.object_name(),
            compression = ?self.archive.compression,
            max_concurrent_fetches = ?self.pipeline.max_concurrent_fetches,
            "Loaded RelayConfig"
        );
        debug!(?self, "RelayConfig loaded (full debug)");
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrent_fetches == Some(0) {
            bail!("pipeline.max_concurrent_fetches must be at least 1");
        }
        if self.upload.bucket().trim().is_empty() {
            bail!("upload.bucket must not be empty");
        }
        if self.upload.object_name().trim().is_empty() {
            bail!("upload.object_name must not be empty");
        }
        Ok(())
    }
}

/// Fill secret fields from the environment.
fn inject_secrets(config: &mut RelayConfig) -> Result<()> {
    if let UploadSection::Http { token, .. } = &mut config.upload {
        match std::env::var(OBJECT_STORE_TOKEN_ENV) {
            Ok(value) => {
                info!("{OBJECT_STORE_TOKEN_ENV} found in env");
                *token = Some(value);
            }
            Err(e) => {
                error!(error = ?e, "{OBJECT_STORE_TOKEN_ENV} environment variable not set");
                bail!("{OBJECT_STORE_TOKEN_ENV} environment variable not set: {e}");
            }
        }
    }
    Ok(())
}

/// Parse a config from YAML text, inject secrets and validate it.
pub fn parse_config(content: &str) -> Result<RelayConfig> {
    let mut config: RelayConfig = match serde_yaml::from_str(content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };
    inject_secrets(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config = parse_config(&config_content)?;
    config.trace_loaded();
    Ok(config)
}
