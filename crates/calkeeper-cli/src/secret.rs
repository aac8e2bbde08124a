//! Secret references in `config.toml`.
//!
//! `client_id` and `client_secret` may point outside the file:
//!
//! - `pass::path/in/store`: first line of `pass show path/in/store`
//! - `env::VAR_NAME`: the value of `$VAR_NAME`
//! - anything else is taken literally

use std::process::Command;

use tracing::debug;

use crate::error::{CliError, CliResult};

/// Expands a possibly-referenced secret value.
pub fn resolve(value: &str) -> CliResult<String> {
    if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path)
    } else if let Some(var) = value.strip_prefix("env::") {
        resolve_env(var)
    } else {
        Ok(value.to_string())
    }
}

fn resolve_pass(path: &str) -> CliResult<String> {
    debug!(entry = %path, "reading secret from pass");
    let output = Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| CliError::Config(format!("failed to run `pass show {path}`: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CliError::Config(format!(
            "`pass show {path}` failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| CliError::Config(format!("`pass show {path}` produced no output")))
}

fn resolve_env(var: &str) -> CliResult<String> {
    std::env::var(var)
        .map_err(|_| CliError::Config(format!("environment variable `{var}` is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_values_pass_through() {
        assert_eq!(resolve("id.apps.googleusercontent.com").unwrap(), "id.apps.googleusercontent.com");
        assert_eq!(resolve("").unwrap(), "");
    }

    #[test]
    fn env_reference_reads_variable() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("_CALKEEPER_TEST_SECRET", "from-env");
        }
        assert_eq!(resolve("env::_CALKEEPER_TEST_SECRET").unwrap(), "from-env");
        unsafe {
            std::env::remove_var("_CALKEEPER_TEST_SECRET");
        }
    }

    #[test]
    fn missing_env_reference_is_config_error() {
        let err = resolve("env::_CALKEEPER_SURELY_UNSET_12345").unwrap_err();
        assert!(matches!(err, CliError::Config(ref msg) if msg.contains("not set")));
    }

    #[test]
    fn unknown_pass_entry_fails() {
        assert!(resolve("pass::calkeeper/does/not/exist/12345").is_err());
    }
}
