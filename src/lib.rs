//! bundle-relay: concrete collaborators, config loading and CLI around
//! the `bundle-relay-core` pipeline orchestrator.

pub mod archive;
pub mod cli;
pub mod fetch;
pub mod load_config;
pub mod locate;
pub mod relay;
pub mod upload;

pub use cli::{run, Cli, Commands};
