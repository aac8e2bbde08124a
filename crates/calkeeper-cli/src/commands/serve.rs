//! `serve`: hold the credential and keep it fresh until shutdown.
//!
//! Bootstrap loads the saved credential or runs the browser flow, after
//! which the lifecycle manager's refresh timer does the work. SIGINT or
//! SIGTERM clears the credential and exits.

use tracing::{info, warn};

use crate::bootstrap;
use crate::config::Settings;
use crate::error::CliResult;

/// Runs until a shutdown signal arrives.
pub async fn run(settings: &Settings) -> CliResult<()> {
    let stack = bootstrap::bootstrap(settings).await?;

    let expiry = stack
        .manager
        .current()
        .await
        .and_then(|r| r.expiry_date)
        .map(calkeeper_core::format_millis);
    info!(
        token_path = %settings.token_path.display(),
        expiry = expiry.as_deref().unwrap_or("never"),
        "credentials ready"
    );

    shutdown_signal().await;

    info!("shutting down");
    stack.manager.clear().await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received SIGINT"),
        Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
    }
}
