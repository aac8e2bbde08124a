//! CLI, bootstrap and credential gate
//!
//! This crate provides the `calkeeper` command-line interface.

pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gate;
pub mod secret;

pub use bootstrap::{AuthMethod, AuthStack};
pub use cli::Cli;
pub use config::{CliConfig, Settings};
pub use error::{CliError, CliResult};
pub use gate::{CredentialGate, Tool};
