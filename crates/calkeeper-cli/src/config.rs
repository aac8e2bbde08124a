//! Configuration.
//!
//! Settings come from three layers, highest first:
//!
//! 1. command-line flags and their environment variables
//!    (`GCP_OAUTH_KEY_PATH`, `MCP_HOST`, ...)
//! 2. `~/.config/calkeeper/config.toml`
//! 3. built-in defaults
//!
//! [`Settings::resolve`] flattens them into the values the commands use.
//!
//! ```toml
//! [auth]
//! method = "oauth2"
//! client_id = "env::MY_CLIENT_ID"
//! client_secret = "pass::google/calkeeper"
//! refresh_lead_secs = 60
//!
//! [server]
//! port = 3001
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use calkeeper_auth::{ClientSecrets, CredentialStore};

use crate::bootstrap::AuthMethod;
use crate::error::{CliError, CliResult};

/// Port used when neither `--port` nor `PORT` nor the config file sets one.
pub const DEFAULT_PORT: u16 = 3001;

/// Lifetime of a Google access token. `refresh_lead_secs` must be shorter.
pub const ACCESS_TOKEN_LIFETIME_SECS: u64 = 3599;

// ---------------------------------------------------------------------------
// CliConfig (config.toml)
// ---------------------------------------------------------------------------

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Debug mode.
    pub debug: bool,

    /// Credential settings.
    pub auth: AuthSettings,

    /// Callback server settings.
    pub server: ServerSettings,
}

/// `[auth]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// `oauth2` or `service-account`.
    pub method: Option<String>,

    /// Client identity file.
    pub secrets_path: Option<PathBuf>,

    /// Saved token file.
    pub token_path: Option<PathBuf>,

    /// OAuth client ID for provisioning (supports `pass::` and `env::`).
    pub client_id: Option<String>,

    /// OAuth client secret for provisioning (supports `pass::` and `env::`).
    pub client_secret: Option<String>,

    /// Refresh this many seconds before the access token expires.
    pub refresh_lead_secs: u64,

    /// Delete the saved token file when the credential is cleared.
    pub delete_on_clear: bool,

    /// Stop waiting for the browser callback after this many seconds.
    pub callback_timeout_secs: Option<u64>,
}

/// `[server]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Public base URL, e.g. `https://cal.example.com`.
    pub host: Option<String>,

    /// Port for the default `http://localhost:<port>` host.
    pub port: Option<u16>,
}

impl CliConfig {
    /// Loads the default config file, or defaults when it does not exist.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses TOML configuration.
    pub fn parse(content: &str) -> CliResult<Self> {
        toml::from_str(content).map_err(|e| CliError::Config(format!("failed to parse config: {e}")))
    }

    /// Serializes to TOML.
    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("failed to serialize config: {e}")))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calkeeper")
    }
}

// ---------------------------------------------------------------------------
// Settings (resolved)
// ---------------------------------------------------------------------------

/// Values from the command line and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub secrets_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth_method: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Effective settings after layering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub method: AuthMethod,
    pub secrets_path: PathBuf,
    pub token_path: PathBuf,
    /// Public base URL; the callback lives at `<host>/oauth2/callback`.
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_lead: Duration,
    pub delete_on_clear: bool,
    pub callback_timeout: Option<Duration>,
}

impl Settings {
    /// Layers `overrides` over `config` over defaults.
    ///
    /// Secret references are only expanded for values that came from the
    /// config file.
    pub fn resolve(overrides: Overrides, config: &CliConfig) -> CliResult<Self> {
        let auth = &config.auth;

        let method = overrides
            .auth_method
            .as_deref()
            .or(auth.method.as_deref())
            .map(str::parse::<AuthMethod>)
            .transpose()?
            .unwrap_or_default();

        let port = overrides.port.or(config.server.port).unwrap_or(DEFAULT_PORT);
        let host = overrides
            .host
            .or_else(|| config.server.host.clone())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        if auth.refresh_lead_secs >= ACCESS_TOKEN_LIFETIME_SECS {
            return Err(CliError::Config(format!(
                "refresh_lead_secs = {} must be shorter than the {ACCESS_TOKEN_LIFETIME_SECS}s token lifetime",
                auth.refresh_lead_secs
            )));
        }

        let client_id = match overrides.client_id {
            Some(id) => Some(id),
            None => auth.client_id.as_deref().map(crate::secret::resolve).transpose()?,
        };
        let client_secret = match overrides.client_secret {
            Some(secret) => Some(secret),
            None => auth
                .client_secret
                .as_deref()
                .map(crate::secret::resolve)
                .transpose()?,
        };

        Ok(Self {
            method,
            secrets_path: overrides
                .secrets_path
                .or_else(|| auth.secrets_path.clone())
                .unwrap_or_else(ClientSecrets::default_path),
            token_path: overrides
                .token_path
                .or_else(|| auth.token_path.clone())
                .unwrap_or_else(CredentialStore::default_path),
            host,
            port,
            client_id,
            client_secret,
            refresh_lead: Duration::from_secs(auth.refresh_lead_secs),
            delete_on_clear: auth.delete_on_clear,
            callback_timeout: auth.callback_timeout_secs.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let settings = Settings::resolve(Overrides::default(), &CliConfig::default()).unwrap();
        assert_eq!(settings.method, AuthMethod::OAuth2);
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.host, "http://localhost:3001");
        assert_eq!(settings.token_path, CredentialStore::default_path());
        assert_eq!(settings.secrets_path, ClientSecrets::default_path());
        assert_eq!(settings.refresh_lead, Duration::ZERO);
        assert!(!settings.delete_on_clear);
        assert!(settings.callback_timeout.is_none());
    }

    #[test]
    fn parses_config_file() {
        let config = CliConfig::parse(
            r#"
            debug = true

            [auth]
            method = "oauth2"
            token_path = "/var/lib/calkeeper/tokens.json"
            refresh_lead_secs = 60
            delete_on_clear = true
            callback_timeout_secs = 300

            [server]
            port = 8080
            "#,
        )
        .unwrap();
        assert!(config.debug);

        let settings = Settings::resolve(Overrides::default(), &config).unwrap();
        assert_eq!(settings.token_path, PathBuf::from("/var/lib/calkeeper/tokens.json"));
        assert_eq!(settings.host, "http://localhost:8080");
        assert_eq!(settings.refresh_lead, Duration::from_secs(60));
        assert!(settings.delete_on_clear);
        assert_eq!(settings.callback_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn rejects_lead_covering_token_lifetime() {
        let config = CliConfig::parse("[auth]\nrefresh_lead_secs = 3600\n").unwrap();
        let err = Settings::resolve(Overrides::default(), &config).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("refresh_lead_secs"));

        let config = CliConfig::parse("[auth]\nrefresh_lead_secs = 3598\n").unwrap();
        let settings = Settings::resolve(Overrides::default(), &config).unwrap();
        assert_eq!(settings.refresh_lead, Duration::from_secs(3598));
    }

    #[test]
    fn overrides_win_over_config() {
        let config = CliConfig::parse(
            r#"
            [auth]
            token_path = "/from/config.json"
            client_id = "config-id"

            [server]
            host = "https://config.example.com"
            port = 8080
            "#,
        )
        .unwrap();
        let overrides = Overrides {
            token_path: Some("/from/flag.json".into()),
            host: Some("https://flag.example.com".into()),
            port: Some(9000),
            client_id: Some("flag-id".into()),
            ..Default::default()
        };

        let settings = Settings::resolve(overrides, &config).unwrap();
        assert_eq!(settings.token_path, PathBuf::from("/from/flag.json"));
        assert_eq!(settings.host, "https://flag.example.com");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.client_id.as_deref(), Some("flag-id"));
    }

    #[test]
    fn port_feeds_default_host() {
        let overrides = Overrides {
            port: Some(4567),
            ..Default::default()
        };
        let settings = Settings::resolve(overrides, &CliConfig::default()).unwrap();
        assert_eq!(settings.host, "http://localhost:4567");
    }

    #[test]
    fn config_secrets_are_resolved() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("_CALKEEPER_CONFIG_TEST_ID", "resolved-id");
        }
        let config = CliConfig::parse(
            r#"
            [auth]
            client_id = "env::_CALKEEPER_CONFIG_TEST_ID"
            client_secret = "plain-secret"
            "#,
        )
        .unwrap();

        let settings = Settings::resolve(Overrides::default(), &config).unwrap();
        assert_eq!(settings.client_id.as_deref(), Some("resolved-id"));
        assert_eq!(settings.client_secret.as_deref(), Some("plain-secret"));
        unsafe {
            std::env::remove_var("_CALKEEPER_CONFIG_TEST_ID");
        }
    }

    #[test]
    fn unknown_auth_method_is_rejected() {
        let overrides = Overrides {
            auth_method: Some("kerberos".into()),
            ..Default::default()
        };
        let err = Settings::resolve(overrides, &CliConfig::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            CliConfig::parse("[auth\nmethod ="),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn dump_round_trips() {
        let mut config = CliConfig::default();
        config.server.port = Some(3002);
        let dumped = config.to_toml().unwrap();
        let parsed = CliConfig::parse(&dumped).unwrap();
        assert_eq!(parsed.server.port, Some(3002));
    }

    #[test]
    fn load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
