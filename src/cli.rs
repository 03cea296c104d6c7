//! # bundle-relay CLI interface
//!
//! Command parsing and the async entrypoint used by `main()` and integration tests.
//! All pipeline logic lives in `bundle-relay-core`; this module only loads the
//! config, assembles collaborators and reports the outcome.
//!
//! ## How To Use
//! - Command line: `bundle-relay run --config relay.yaml --pattern '\.txt$'`
//! - Programmatic: call [`run`] (or [`run_with_cancel`]) with a constructed [`Cli`].
//!
//! On success `run` prints the object id on stdout; logs go to stderr.
use std::path::PathBuf;

use anyhow::Result;
use bundle_relay_core::{CancellationToken, FileLocator, PipelineConfig};
use clap::{Parser, Subcommand};

use crate::load_config::load_config;
use crate::relay::{build_relay, build_source};

/// CLI for bundle-relay: collect matching files into one archive in an object store.
#[derive(Parser)]
#[clap(
    name = "bundle-relay",
    version,
    about = "Locate files by pattern, zip them and upload the archive to an object store"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Locate, fetch, archive and upload every file matching the pattern
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Regular expression matched against file paths
        #[clap(long)]
        pattern: String,
        /// Object name to upload under, overriding upload.object_name
        #[clap(long)]
        destination: Option<String>,
    },
    /// List the files a pattern selects without fetching them
    Locate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Regular expression matched against file paths
        #[clap(long)]
        pattern: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    run_with_cancel(cli, CancellationToken::new()).await
}

/// Like [`run`], stopping early once `cancel` fires.
pub async fn run_with_cancel(cli: Cli, cancel: CancellationToken) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run {
            config,
            pattern,
            destination,
        } => {
            let config = load_config(config)?;
            let mut relay = build_relay(&config)?;
            if let Some(destination) = destination {
                let pipeline = PipelineConfig {
                    destination,
                    ..relay.config().clone()
                };
                relay = relay.with_config(pipeline);
            }
            tracing::info!(command = "run", pattern = %pattern, "Starting bundle relay");

            match relay.execute(&pattern, &cancel, None).await {
                Ok(report) => {
                    tracing::info!(command = "run", ?report, "Bundle relay complete");
                    println!("{}", report.object_id);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "run", error = %e, "Bundle relay failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Locate { config, pattern } => {
            let config = load_config(config)?;
            let client = reqwest::Client::new();
            let (locator, _) = build_source(&config.source, &client);
            let handles = locator
                .locate(&pattern)
                .await
                .map_err(|e| anyhow::anyhow!("Locate failed: {e}"))?;
            tracing::info!(command = "locate", matches = handles.len(), "Locate complete");
            for handle in handles {
                println!("{handle}");
            }
            Ok(())
        }
    }
}
