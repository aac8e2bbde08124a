//! OAuth client identity (client id and secret).
//!
//! Google Cloud Console hands out a JSON file with either an `installed`
//! or a `web` section; gcloud-style files put the fields at the root. All
//! three are accepted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AuthError, AuthResult};
use crate::store::write_private;

/// Default file name of the client identity file.
pub const DEFAULT_SECRETS_FILE_NAME: &str = "gcp-oauth.keys.json";

/// Environment variable holding the client id used for provisioning.
pub const CLIENT_ID_ENV: &str = "GCP_OAUTH_CLIENT_ID";
/// Environment variable holding the client secret used for provisioning.
pub const CLIENT_SECRET_ENV: &str = "GCP_OAUTH_CLIENT_SECRET";

/// OAuth client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
    /// Redirect URIs registered for the client, if listed in the file.
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    installed: Option<NestedSecrets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    web: Option<NestedSecrets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NestedSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientSecrets {
    /// Creates client secrets with no registered redirect URIs.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uris: Vec::new(),
        }
    }

    /// Default location: `~/.config/calkeeper/gcp-oauth.keys.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calkeeper")
            .join(DEFAULT_SECRETS_FILE_NAME)
    }

    /// Loads client secrets from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthError::storage("read client secrets", path, e))?;
        Self::from_json(&content)
    }

    /// Parses client secrets from a JSON string.
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let file: SecretsFile = serde_json::from_str(json).map_err(|e| {
            AuthError::configuration("failed to parse client secrets JSON").with_source(e)
        })?;

        if let Some(nested) = file.installed.or(file.web) {
            return Ok(Self {
                client_id: nested.client_id,
                client_secret: nested.client_secret,
                redirect_uris: nested.redirect_uris,
            });
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(AuthError::configuration(
            "client secrets must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level",
        ))
    }

    /// Checks that both fields are non-empty.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.is_empty() {
            return Err(AuthError::configuration("client_id is required"));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::configuration("client_secret is required"));
        }
        Ok(())
    }

    /// Serializes to the `installed` layout.
    pub fn to_json(&self) -> AuthResult<String> {
        let file = SecretsFile {
            installed: Some(NestedSecrets {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                redirect_uris: self.redirect_uris.clone(),
            }),
            web: None,
            client_id: None,
            client_secret: None,
        };
        serde_json::to_string_pretty(&file).map_err(|e| {
            AuthError::configuration("failed to serialize client secrets").with_source(e)
        })
    }
}

/// Writes the client identity file from explicit values if it does not
/// exist yet.
///
/// Returns `Ok(false)` when the file was already present. Missing values
/// produce a single configuration error naming every missing variable.
pub fn provision_secrets_file(
    path: &Path,
    client_id: Option<&str>,
    client_secret: Option<&str>,
    redirect_uri: &str,
) -> AuthResult<bool> {
    if path.exists() {
        return Ok(false);
    }

    let client_id = client_id.filter(|s| !s.is_empty());
    let client_secret = client_secret.filter(|s| !s.is_empty());
    let (client_id, client_secret) = match (client_id, client_secret) {
        (Some(id), Some(secret)) => (id, secret),
        (id, secret) => {
            let mut missing = Vec::new();
            if id.is_none() {
                missing.push(format!("{} is not set", CLIENT_ID_ENV));
            }
            if secret.is_none() {
                missing.push(format!("{} is not set", CLIENT_SECRET_ENV));
            }
            return Err(AuthError::configuration(format!(
                "{} does not exist and cannot be provisioned: {}",
                path.display(),
                missing.join(", ")
            )));
        }
    };

    let secrets = ClientSecrets {
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        redirect_uris: vec![redirect_uri.to_string()],
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| AuthError::storage("create directory", parent, e))?;
    }
    write_private(path, secrets.to_json()?.as_bytes())
        .map_err(|e| AuthError::storage("write client secrets", path, e))?;

    info!(path = %path.display(), "provisioned client secrets file");
    Ok(true)
}
