//! exec_command tool implementation.

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exec::{ExecEngine, ExecOutcome, ExecRequest};

use super::ToolReply;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Input for exec_command tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecCommandInput {
    /// Shell command to run. May span multiple lines.
    pub command: String,

    /// Session id from list_sessions. Defaults to the focused session.
    #[serde(default)]
    pub tab_id: Option<String>,

    /// Short explanation of what the command does.
    #[serde(default)]
    pub command_explanation: Option<String>,

    /// Timeout in milliseconds (default 30000).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Handle the exec_command tool call.
pub async fn handle_exec_command(
    engine: Arc<ExecEngine>,
    params: Parameters<ExecCommandInput>,
) -> Result<Json<ToolReply<ExecOutcome>>, McpError> {
    let input = params.0;
    let request = ExecRequest {
        command: input.command,
        tab_id: input.tab_id,
        explanation: input.command_explanation,
        timeout_ms: input.timeout_ms,
    };

    let reply = match engine.exec(request).await {
        Ok(outcome) => ToolReply::ok(outcome.message.clone(), outcome),
        Err(e) => ToolReply::error(&e),
    };
    Ok(Json(reply))
}
