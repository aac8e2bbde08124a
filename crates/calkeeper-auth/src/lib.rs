//! OAuth2 credential lifecycle for the Google Calendar integration.
//!
//! - [`CredentialStore`] persists one [`CredentialRecord`] as JSON.
//! - [`TokenLifecycleManager`] owns the in-memory record, validates it
//!   before use and refreshes it proactively before expiry.
//! - [`InteractiveAuthorizer`] runs the browser consent flow when no usable
//!   credential exists.

pub mod authorizer;
pub mod error;
pub mod lifecycle;
pub mod oauth;
pub mod record;
pub mod secrets;
pub mod store;

#[cfg(test)]
mod testing;

pub use authorizer::{
    AuthorizationSession, AuthorizerConfig, CALLBACK_PATH, ClientBuilder, InteractiveAuthorizer,
    SessionState, UrlOpener, callback_url, google_client_builder,
};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use lifecycle::{LifecycleConfig, TokenLifecycleManager};
pub use oauth::{BoxFuture, CALENDAR_SCOPE, GoogleOAuthClient, OAuthClient, PkceFlow};
pub use record::CredentialRecord;
pub use secrets::{ClientSecrets, provision_secrets_file};
pub use store::CredentialStore;
