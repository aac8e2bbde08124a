//! `token` and `check`: consumers of a valid credential.

use crate::bootstrap;
use crate::config::Settings;
use crate::error::{CliError, CliResult};
use crate::gate::CredentialGate;

/// Prints a valid access token, refreshing an expired one first.
pub async fn token(settings: &Settings) -> CliResult<()> {
    let stack = bootstrap::build(settings)?;
    stack.manager.load_saved().await;

    let token = stack
        .manager
        .access_token()
        .await
        .ok_or_else(|| CliError::auth_required(&settings.host))?;
    println!("{token}");
    Ok(())
}

/// Runs the credential gate for `tool`.
pub async fn check(settings: &Settings, tool: &str) -> CliResult<()> {
    let stack = bootstrap::build(settings)?;
    stack.manager.load_saved().await;

    let gate = CredentialGate::new(stack.manager, &settings.host);
    let tool = gate.authorize(tool).await?;
    println!("ok {tool}");
    Ok(())
}
