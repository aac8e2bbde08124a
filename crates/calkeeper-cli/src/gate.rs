//! Credential gate for calendar tool invocations.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use calkeeper_auth::TokenLifecycleManager;

use crate::error::{CliError, CliResult};

/// Calendar tools that need a valid credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    ListCalendars,
    ListEvents,
    ListColors,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
}

impl Tool {
    /// Every known tool.
    pub const ALL: [Tool; 6] = [
        Tool::ListCalendars,
        Tool::ListEvents,
        Tool::ListColors,
        Tool::CreateEvent,
        Tool::UpdateEvent,
        Tool::DeleteEvent,
    ];

    /// Wire name of the tool.
    pub fn name(self) -> &'static str {
        match self {
            Tool::ListCalendars => "list-calendars",
            Tool::ListEvents => "list-events",
            Tool::ListColors => "list-colors",
            Tool::CreateEvent => "create-event",
            Tool::UpdateEvent => "update-event",
            Tool::DeleteEvent => "delete-event",
        }
    }
}

impl FromStr for Tool {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|tool| tool.name() == s)
            .ok_or_else(|| CliError::UnknownTool(s.to_string()))
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Refuses tool calls unless the manager holds a valid credential.
#[derive(Debug, Clone)]
pub struct CredentialGate {
    manager: TokenLifecycleManager,
    host: String,
}

impl CredentialGate {
    /// `host` is the URL users are sent to when authentication is needed.
    pub fn new(manager: TokenLifecycleManager, host: impl Into<String>) -> Self {
        Self {
            manager,
            host: host.into(),
        }
    }

    /// Validates the credential, refreshing it if expired, then resolves
    /// the tool name.
    pub async fn authorize(&self, tool: &str) -> CliResult<Tool> {
        if !self.manager.validate().await {
            return Err(CliError::auth_required(&self.host));
        }
        let tool = tool.parse::<Tool>()?;
        debug!(tool = %tool, "tool call authorized");
        Ok(tool)
    }
}
