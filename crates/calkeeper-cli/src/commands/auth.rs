//! Authentication commands: `auth`, `status`, `logout`.

use std::path::Path;

use calkeeper_auth::{CredentialRecord, CredentialStore};
use calkeeper_core::{EpochMillis, format_millis, now_millis};

use crate::bootstrap;
use crate::config::Settings;
use crate::error::{CliError, CliResult};

/// Runs the browser consent flow.
///
/// Without `force`, a saved credential short-circuits the flow.
pub async fn auth(settings: &Settings, force: bool) -> CliResult<()> {
    let stack = bootstrap::build(settings)?;

    if !force && stack.manager.load_saved().await {
        println!("Already authenticated with Google Calendar.");
        println!("Use --force to re-authenticate.");
        return Ok(());
    }

    println!("Starting Google Calendar authentication...");
    println!();
    println!("A browser window will open for you to authorize access.");
    println!("If the browser doesn't open, check the terminal for a URL to copy.");
    println!();

    if !stack.authorizer.authorize().await {
        return Err(CliError::auth_required(&settings.host));
    }

    println!("Authentication successful!");
    println!("Tokens saved to: {}", settings.token_path.display());
    Ok(())
}

/// Prints the saved credential without refreshing it.
pub fn status(settings: &Settings) -> CliResult<()> {
    let store = CredentialStore::new(&settings.token_path);
    let record = match store.load() {
        Ok(record) => Some(record),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };
    print!("{}", render_status(store.path(), record.as_ref(), now_millis()));
    Ok(())
}

/// Formats the `status` report.
pub fn render_status(path: &Path, record: Option<&CredentialRecord>, now: EpochMillis) -> String {
    let mut out = format!("token file:    {}\n", path.display());

    let Some(record) = record else {
        out.push_str("authenticated: no\n");
        return out;
    };

    let yes_no = |b: bool| if b { "yes" } else { "no" };
    out.push_str(&format!("authenticated: {}\n", yes_no(record.is_usable())));
    out.push_str(&format!("access token:  {}\n", yes_no(record.is_usable())));
    out.push_str(&format!(
        "refresh token: {}\n",
        yes_no(record.refresh_token.is_some())
    ));
    match record.expiry_date {
        Some(expiry) => {
            let state = if record.is_fresh_at(now) {
                "valid"
            } else {
                "expired"
            };
            out.push_str(&format!("expires:       {} ({state})\n", format_millis(expiry)));
        }
        None => out.push_str("expires:       never\n"),
    }
    out
}

/// Deletes the saved credential so the next run has to authenticate.
pub fn logout(settings: &Settings) -> CliResult<()> {
    let store = CredentialStore::new(&settings.token_path);
    store.remove()?;
    println!("Removed saved credentials at {}", store.path().display());
    Ok(())
}
