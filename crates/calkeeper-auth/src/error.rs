//! Error types for credential lifecycle operations.
//!
//! Every failure in this crate is an [`AuthError`] carrying an
//! [`AuthErrorCode`]. The lifecycle manager and the interactive authorizer
//! inspect the code to decide what to log and then collapse the error into
//! a boolean for their callers.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// The category of an authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// No durable credential record exists. Expected on first run.
    NotFound,
    /// The durable record exists but could not be parsed.
    CorruptData,
    /// Reading or writing a file failed.
    Storage,
    /// The token endpoint rejected a refresh, or there was nothing to refresh.
    RefreshFailed,
    /// The interactive consent flow failed (missing code, exchange, bind).
    AuthorizationFailed,
    /// Missing or invalid configuration (client secrets, redirect URI).
    ConfigurationError,
    /// Network error talking to the token endpoint.
    NetworkError,
    /// The token endpoint answered with something we could not parse.
    InvalidResponse,
}

impl AuthErrorCode {
    /// Returns a stable snake_case name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::CorruptData => "corrupt_data",
            Self::Storage => "storage",
            Self::RefreshFailed => "refresh_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::ConfigurationError => "configuration_error",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by the credential lifecycle subsystem.
#[derive(Debug, Error)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// No durable record at `path`.
    pub fn not_found(path: &Path) -> Self {
        Self::new(
            AuthErrorCode::NotFound,
            format!("no credential record at {}", path.display()),
        )
    }

    /// Unparseable record at `path`.
    pub fn corrupt_data(path: &Path, source: serde_json::Error) -> Self {
        Self::new(
            AuthErrorCode::CorruptData,
            format!("credential record at {} is not valid JSON", path.display()),
        )
        .with_source(source)
    }

    /// I/O failure on `path`.
    pub fn storage(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::new(
            AuthErrorCode::Storage,
            format!("failed to {} {}", action, path.display()),
        )
        .with_source(source)
    }

    /// Creates a refresh failure.
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::RefreshFailed, message)
    }

    /// Creates an authorization failure.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthorizationFailed, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::ConfigurationError, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::NetworkError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidResponse, message)
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for a missing durable record.
    pub fn is_not_found(&self) -> bool {
        self.code == AuthErrorCode::NotFound
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

/// A specialized Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn error_code_names() {
        assert_eq!(AuthErrorCode::NotFound.as_str(), "not_found");
        assert_eq!(AuthErrorCode::RefreshFailed.as_str(), "refresh_failed");
        assert_eq!(
            AuthErrorCode::AuthorizationFailed.to_string(),
            "authorization_failed"
        );
    }

    #[test]
    fn not_found_mentions_path() {
        let err = AuthError::not_found(&PathBuf::from("/tmp/tokens.json"));
        assert!(err.is_not_found());
        assert!(err.message().contains("/tmp/tokens.json"));
    }

    #[test]
    fn display_includes_source() {
        let io_err = std::io::Error::other("disk full");
        let err = AuthError::storage("write", &PathBuf::from("/x"), io_err);
        let display = err.to_string();
        assert!(display.starts_with("storage: failed to write /x"));
        assert!(display.contains("disk full"));
    }

    #[test]
    fn source_is_exposed() {
        use std::error::Error;
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = AuthError::corrupt_data(&PathBuf::from("/x"), parse_err);
        assert_eq!(err.code(), AuthErrorCode::CorruptData);
        assert!(err.source().is_some());
    }
}
