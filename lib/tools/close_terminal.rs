//! close_terminal tool implementation.

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exec::ExecEngine;
use crate::host::LocalHost;
use crate::types::{self, TerminalError};

use super::ToolReply;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Input for close_terminal tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseTerminalInput {
    /// Session id to close.
    pub tab_id: String,

    /// Kill (SIGKILL) instead of hanging up (SIGHUP).
    #[serde(default)]
    pub force: bool,
}

/// Output for close_terminal tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseTerminalOutput {
    pub closed: bool,

    /// Exit code of the terminal's process.
    pub exit_code: Option<i32>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Handle the close_terminal tool call.
pub async fn handle_close_terminal(
    engine: Arc<ExecEngine>,
    host: Arc<LocalHost>,
    params: Parameters<CloseTerminalInput>,
) -> Result<Json<ToolReply<CloseTerminalOutput>>, McpError> {
    let result = close(&engine, host, params.0).await;
    Ok(Json(ToolReply::from_result(result, |out| match out.exit_code {
        Some(code) => format!("Terminal closed (exit code {})", code),
        None => "Terminal closed".to_string(),
    })))
}

async fn close(
    engine: &ExecEngine,
    host: Arc<LocalHost>,
    input: CloseTerminalInput,
) -> types::Result<CloseTerminalOutput> {
    let registry = engine.sessions();
    let sessions = registry.list_sessions();
    let session = registry.resolve(&sessions, Some(input.tab_id.as_str()))?;
    let key = host
        .key_of(&session.tab)
        .ok_or_else(|| TerminalError::SessionNotFound(input.tab_id.clone()))?;

    engine.tracker().abort(session.id);

    let force = input.force;
    let exit_code = tokio::task::spawn_blocking(move || host.close(&key, force))
        .await
        .map_err(|e| TerminalError::Host(e.to_string()))??;

    Ok(CloseTerminalOutput {
        closed: true,
        exit_code,
    })
}
