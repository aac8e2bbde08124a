//! OAuth 2.0 client abstraction and the Google implementation.
//!
//! The lifecycle manager and the interactive authorizer only talk to the
//! [`OAuthClient`] trait, so tests can drive them with an in-memory client.
//! [`GoogleOAuthClient`] speaks to Google's token endpoint over HTTPS and
//! doubles as the credential slot that calendar requests read their bearer
//! token from.

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::form_urlencoded;

use crate::error::{AuthError, AuthResult};
use crate::record::CredentialRecord;
use crate::secrets::ClientSecrets;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Full read/write access to Google Calendar.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Verifier length in random bytes before base64url encoding.
const CODE_VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A boxed future, used to keep [`OAuthClient`] object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations the credential lifecycle needs from an OAuth client.
pub trait OAuthClient: Send + Sync {
    /// Builds the consent URL the user opens in a browser.
    fn authorization_url(&self, scopes: &[String], pkce: &PkceFlow) -> String;

    /// Exchanges an authorization code for a fresh credential record.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        pkce_verifier: &'a str,
    ) -> BoxFuture<'a, AuthResult<CredentialRecord>>;

    /// Obtains a new access token using `current.refresh_token`.
    fn refresh<'a>(
        &'a self,
        current: &'a CredentialRecord,
    ) -> BoxFuture<'a, AuthResult<CredentialRecord>>;

    /// Replaces the credentials used for API requests. `None` clears them.
    fn set_credentials(&self, record: Option<&CredentialRecord>);
}

/// PKCE verifier/challenge pair plus the anti-CSRF `state` value.
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// High-entropy secret sent with the code exchange.
    pub verifier: String,
    /// base64url(SHA-256(verifier)), sent with the consent request.
    pub challenge: String,
    /// Echoed back by the provider on the redirect.
    pub state: String,
}

impl PkceFlow {
    /// Generates a fresh verifier, challenge and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_BYTES);
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(STATE_BYTES),
        }
    }

    /// Computes the S256 challenge for `verifier`.
    pub fn challenge_for(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// OAuth client for Google's installed-application flow.
#[derive(Debug)]
pub struct GoogleOAuthClient {
    secrets: ClientSecrets,
    redirect_uri: String,
    http_client: reqwest::Client,
    credentials: RwLock<Option<CredentialRecord>>,
}

impl GoogleOAuthClient {
    /// Creates a client for `secrets` redirecting to `redirect_uri`.
    pub fn new(secrets: ClientSecrets, redirect_uri: impl Into<String>) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(concat!("calkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::configuration("failed to create HTTP client").with_source(e))?;

        Ok(Self {
            secrets,
            redirect_uri: redirect_uri.into(),
            http_client,
            credentials: RwLock::new(None),
        })
    }

    /// Returns the redirect URI this client was configured with.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the access token currently applied to this client.
    pub fn access_token(&self) -> Option<String> {
        self.credentials
            .read()
            .ok()
            .and_then(|c| c.as_ref().map(|r| r.access_token.clone()))
            .filter(|t| !t.is_empty())
    }

    async fn post_token_request(&self, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::network("token request timed out").with_source(e)
                } else {
                    AuthError::network("token request failed").with_source(e)
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network("failed to read token response").with_source(e))?;

        if !status.is_success() {
            return Err(AuthError::authorization(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::invalid_response("invalid token response").with_source(e))
    }
}

impl OAuthClient for GoogleOAuthClient {
    fn authorization_url(&self, scopes: &[String], pkce: &PkceFlow) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &pkce.state)
            .finish();
        format!("{}?{}", GOOGLE_AUTH_URL, query)
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        pkce_verifier: &'a str,
    ) -> BoxFuture<'a, AuthResult<CredentialRecord>> {
        Box::pin(async move {
            debug!("exchanging authorization code");
            let token = self
                .post_token_request(&[
                    ("client_id", self.secrets.client_id.as_str()),
                    ("client_secret", self.secrets.client_secret.as_str()),
                    ("code", code),
                    ("code_verifier", pkce_verifier),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", self.redirect_uri.as_str()),
                ])
                .await?;

            if token.refresh_token.is_none() {
                info!("token endpoint issued no refresh token; proactive refresh will be unavailable");
            }
            Ok(CredentialRecord::from_expires_in(
                token.access_token,
                token.refresh_token,
                token.expires_in,
            ))
        })
    }

    fn refresh<'a>(
        &'a self,
        current: &'a CredentialRecord,
    ) -> BoxFuture<'a, AuthResult<CredentialRecord>> {
        Box::pin(async move {
            let refresh_token = current
                .refresh_token
                .as_deref()
                .ok_or_else(|| AuthError::refresh_failed("no refresh token available"))?;

            let token = self
                .post_token_request(&[
                    ("client_id", self.secrets.client_id.as_str()),
                    ("client_secret", self.secrets.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ])
                .await
                .map_err(|e| AuthError::refresh_failed("token refresh rejected").with_source(e))?;

            Ok(CredentialRecord::from_expires_in(
                token.access_token,
                token.refresh_token,
                token.expires_in,
            )
            .inherit_refresh_token(current))
        })
    }

    fn set_credentials(&self, record: Option<&CredentialRecord>) {
        if let Ok(mut slot) = self.credentials.write() {
            *slot = record.cloned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(
            ClientSecrets::new("test-client.apps.googleusercontent.com", "test-secret"),
            "http://localhost:3001/oauth2/callback",
        )
        .unwrap()
    }

    #[test]
    fn pkce_verifier_length() {
        // 32 bytes base64url without padding
        assert_eq!(PkceFlow::new().verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_example() {
        let challenge = PkceFlow::challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn pkce_values_are_random() {
        let a = PkceFlow::new();
        let b = PkceFlow::new();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn authorization_url_requests_offline_calendar_access() {
        let pkce = PkceFlow::new();
        let url = client().authorization_url(&[CALENDAR_SCOPE.to_string()], &pkce);
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["scope"], CALENDAR_SCOPE);
        assert_eq!(pairs["redirect_uri"], "http://localhost:3001/oauth2/callback");
        assert_eq!(pairs["state"], pkce.state);
        assert_eq!(pairs["code_challenge"], pkce.challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[test]
    fn credential_slot_tracks_applied_record() {
        let client = client();
        assert!(client.access_token().is_none());

        client.set_credentials(Some(&CredentialRecord::new("a", None, None)));
        assert_eq!(client.access_token().as_deref(), Some("a"));

        client.set_credentials(None);
        assert!(client.access_token().is_none());
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_fast() {
        let record = CredentialRecord::new("a", None, Some(0));
        let err = client().refresh(&record).await.unwrap_err();
        assert_eq!(err.code(), crate::error::AuthErrorCode::RefreshFailed);
    }
}
