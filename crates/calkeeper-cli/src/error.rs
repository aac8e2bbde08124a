//! CLI error types.

use thiserror::Error;

use calkeeper_auth::AuthError;
use calkeeper_core::TracingError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced by the `calkeeper` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential lifecycle failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// No valid credential; the user has to authenticate.
    #[error("{0}")]
    AuthRequired(String),

    /// A tool name the gate does not know.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A configured feature this build does not support.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Logging could not be initialised.
    #[error(transparent)]
    Tracing(#[from] TracingError),
}

/// Message shown when a privileged call finds no valid credential.
pub fn auth_required_message(host: &str) -> String {
    format!("Authentication required. Please visit {host} to authenticate with Google Calendar.")
}

impl CliError {
    /// [`CliError::AuthRequired`] pointing the user at `host`.
    pub fn auth_required(host: &str) -> Self {
        Self::AuthRequired(auth_required_message(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calkeeper_core::{TracingConfig, init_tracing};

    #[test]
    fn auth_required_names_host() {
        let err = CliError::auth_required("http://localhost:3001");
        assert_eq!(
            err.to_string(),
            "Authentication required. Please visit http://localhost:3001 to authenticate with Google Calendar."
        );
    }

    #[test]
    fn tracing_errors_convert() {
        let bad_filter = TracingConfig::default().with_env_filter("calkeeper=[");
        let err: CliError = init_tracing(bad_filter).unwrap_err().into();
        assert!(matches!(err, CliError::Tracing(TracingError::EnvFilter(_))));
    }

    #[test]
    fn auth_errors_pass_through() {
        let err: CliError = AuthError::configuration("client_id is required").into();
        assert!(err.to_string().contains("client_id is required"));
    }
}
