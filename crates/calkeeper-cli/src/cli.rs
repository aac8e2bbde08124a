//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

/// calkeeper - Google Calendar credentials that stay fresh
#[derive(Debug, Parser)]
#[command(name = "calkeeper")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALKEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    // --- Credential files ---
    /// Path to the OAuth client identity file (gcp-oauth.keys.json)
    #[arg(long, env = "GCP_OAUTH_KEY_PATH")]
    pub secrets_path: Option<PathBuf>,

    /// Path to the saved token file
    #[arg(long, env = "GCP_SAVED_TOKENS_PATH")]
    pub token_path: Option<PathBuf>,

    // --- Server ---
    /// Public base URL the OAuth callback is served under
    #[arg(long, env = "MCP_HOST")]
    pub host: Option<String>,

    /// Port used for the default host
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Authentication method: oauth2 or service-account
    #[arg(long, env = "MCP_AUTH_METHOD")]
    pub auth_method: Option<String>,

    // --- Provisioning ---
    /// OAuth client ID, used to create the identity file when it is missing
    #[arg(long, env = "GCP_OAUTH_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// OAuth client secret, used to create the identity file when it is missing
    #[arg(long, env = "GCP_OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Values given on the command line or through the environment.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            secrets_path: self.secrets_path.clone(),
            token_path: self.token_path.clone(),
            host: self.host.clone(),
            port: self.port,
            auth_method: self.auth_method.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    /// Returns whether the command runs as a long-lived process.
    pub fn is_daemon(&self) -> bool {
        matches!(self.command, None | Some(Command::Serve))
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate if needed, then keep the credential fresh until stopped (default)
    Serve,

    /// Run the browser consent flow
    Auth {
        /// Re-authenticate even if a saved credential exists
        #[arg(long, short)]
        force: bool,
    },

    /// Show the saved credential without refreshing it
    Status,

    /// Print a valid access token, refreshing it if expired
    Token,

    /// Check whether a calendar tool may run
    Check {
        /// Tool name, e.g. list-events
        tool: String,
    },

    /// Delete the saved credential
    Logout,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["calkeeper", "logout"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Logout)));
        assert!(!cli.is_daemon());
        assert!(Cli::try_parse_from(["calkeeper", "logout", "--delete"]).is_err());

        let cli = Cli::try_parse_from(["calkeeper", "check", "list-events"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Check { ref tool }) if tool == "list-events"));
    }

    #[test]
    fn no_subcommand_serves() {
        let cli = Cli::try_parse_from(["calkeeper"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.is_daemon());
    }

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "calkeeper",
            "--token-path",
            "/tmp/tokens.json",
            "--port",
            "4000",
            "status",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.token_path, Some(PathBuf::from("/tmp/tokens.json")));
        assert_eq!(overrides.port, Some(4000));
    }
}
