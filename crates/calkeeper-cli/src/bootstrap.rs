//! Startup: pick the auth method and wire the credential lifecycle.
//!
//! [`build`] provisions the client identity file if needed and creates the
//! OAuth client, [`TokenLifecycleManager`] and [`InteractiveAuthorizer`].
//! [`bootstrap`] additionally makes sure a credential is loaded, running the
//! browser flow when there is none.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use calkeeper_auth::{
    AuthorizerConfig, ClientSecrets, CredentialStore, GoogleOAuthClient, InteractiveAuthorizer,
    LifecycleConfig, OAuthClient, TokenLifecycleManager, callback_url, provision_secrets_file,
};

use crate::config::Settings;
use crate::error::{CliError, CliResult};

/// How the process authenticates against Google.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMethod {
    /// User consent via the browser, tokens saved locally.
    #[default]
    OAuth2,
    /// Service account key. Not supported.
    ServiceAccount,
}

impl FromStr for AuthMethod {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oauth2" | "oauth" => Ok(Self::OAuth2),
            "service-account" | "service_account" | "serviceaccount" => Ok(Self::ServiceAccount),
            other => Err(CliError::Config(format!(
                "unknown auth method '{other}' (expected 'oauth2' or 'service-account')"
            ))),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth2 => write!(f, "oauth2"),
            Self::ServiceAccount => write!(f, "service-account"),
        }
    }
}

/// The wired credential lifecycle.
#[derive(Debug)]
pub struct AuthStack {
    pub manager: TokenLifecycleManager,
    pub authorizer: InteractiveAuthorizer,
}

/// Provisions the identity file if needed and wires the Google client.
pub fn build(settings: &Settings) -> CliResult<AuthStack> {
    if settings.method == AuthMethod::ServiceAccount {
        return Err(CliError::Unsupported(
            "service account authentication; set MCP_AUTH_METHOD=oauth2".into(),
        ));
    }

    let redirect_uri = callback_url(&settings.host);
    if provision_secrets_file(
        &settings.secrets_path,
        settings.client_id.as_deref(),
        settings.client_secret.as_deref(),
        &redirect_uri,
    )? {
        info!(path = %settings.secrets_path.display(), "created client identity file");
    }

    let secrets = ClientSecrets::from_file(&settings.secrets_path)?;
    secrets.validate()?;
    if !secrets.redirect_uris.is_empty() && !secrets.redirect_uris.contains(&redirect_uri) {
        debug!(
            redirect_uri = %redirect_uri,
            registered = ?secrets.redirect_uris,
            "redirect URI is not listed in the client identity file"
        );
    }

    let client = GoogleOAuthClient::new(secrets, &redirect_uri)?;
    Ok(build_with_client(settings, Arc::new(client)))
}

/// Wires the lifecycle around an existing OAuth client.
pub fn build_with_client(settings: &Settings, client: Arc<dyn OAuthClient>) -> AuthStack {
    let store = CredentialStore::new(&settings.token_path);
    let lifecycle = LifecycleConfig::default()
        .with_refresh_lead(settings.refresh_lead)
        .with_delete_on_clear(settings.delete_on_clear);
    let manager = TokenLifecycleManager::with_config(store, client, lifecycle);

    let authorizer_config = AuthorizerConfig::new(&settings.secrets_path, &settings.host)
        .with_callback_timeout(settings.callback_timeout);
    let authorizer = InteractiveAuthorizer::new(manager.clone(), authorizer_config);

    AuthStack {
        manager,
        authorizer,
    }
}

/// Builds the stack and ensures a credential is loaded.
///
/// Fails with [`CliError::AuthRequired`] when neither a saved credential nor
/// the browser flow produced one.
pub async fn bootstrap(settings: &Settings) -> CliResult<AuthStack> {
    let stack = build(settings)?;
    if !stack.authorizer.start().await {
        return Err(CliError::auth_required(&settings.host));
    }
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliConfig, Overrides};
    use calkeeper_auth::{CredentialRecord, SessionState};

    fn settings_in(dir: &tempfile::TempDir) -> Settings {
        let overrides = Overrides {
            secrets_path: Some(dir.path().join("keys.json")),
            token_path: Some(dir.path().join("tokens.json")),
            host: Some("http://127.0.0.1:0".into()),
            ..Default::default()
        };
        Settings::resolve(overrides, &CliConfig::default()).unwrap()
    }

    #[test]
    fn parses_auth_methods() {
        assert_eq!("oauth2".parse::<AuthMethod>().unwrap(), AuthMethod::OAuth2);
        assert_eq!("OAuth2".parse::<AuthMethod>().unwrap(), AuthMethod::OAuth2);
        assert_eq!(
            "service-account".parse::<AuthMethod>().unwrap(),
            AuthMethod::ServiceAccount
        );
        assert!("basic".parse::<AuthMethod>().is_err());
        assert_eq!(AuthMethod::ServiceAccount.to_string(), "service-account");
    }

    #[test]
    fn service_account_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.method = AuthMethod::ServiceAccount;

        assert!(matches!(build(&settings), Err(CliError::Unsupported(_))));
    }

    #[test]
    fn missing_identity_without_env_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = build(&settings_in(&dir)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("GCP_OAUTH_CLIENT_ID"));
        assert!(message.contains("GCP_OAUTH_CLIENT_SECRET"));
    }

    #[tokio::test]
    async fn provisions_identity_from_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.client_id = Some("id.apps.googleusercontent.com".into());
        settings.client_secret = Some("secret".into());

        let stack = build(&settings).unwrap();
        let secrets = ClientSecrets::from_file(&settings.secrets_path).unwrap();
        assert_eq!(secrets.client_id, "id.apps.googleusercontent.com");
        assert_eq!(
            secrets.redirect_uris,
            vec!["http://127.0.0.1:0/oauth2/callback".to_string()]
        );
        assert_eq!(stack.authorizer.redirect_uri(), "http://127.0.0.1:0/oauth2/callback");
    }

    #[tokio::test]
    async fn bootstrap_uses_saved_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.client_id = Some("id".into());
        settings.client_secret = Some("secret".into());

        let record = CredentialRecord::new("saved", None, None);
        CredentialStore::new(&settings.token_path).save(&record).unwrap();

        let stack = bootstrap(&settings).await.unwrap();
        assert_eq!(stack.manager.current().await, Some(record));
    }

    #[tokio::test]
    async fn unanswered_session_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.client_id = Some("id".into());
        settings.client_secret = Some("secret".into());
        settings.callback_timeout = Some(std::time::Duration::from_millis(20));

        // No browser in tests: the session times out waiting for a callback.
        let stack = build(&settings).unwrap();
        let session = stack.authorizer.begin().await.unwrap();
        let progress = session.subscribe();
        assert!(session.wait().await.is_err());
        assert_eq!(*progress.borrow(), SessionState::Failed);
    }
}
