//! abort_command tool implementation.

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exec::ExecEngine;

use super::ToolReply;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Input for abort_command tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AbortCommandInput {
    /// Session whose command to abort. All running commands when omitted.
    #[serde(default)]
    pub tab_id: Option<String>,
}

/// Output for abort_command tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AbortCommandOutput {
    /// Sessions whose commands were flagged for abort.
    pub aborted_sessions: Vec<usize>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Handle the abort_command tool call.
pub async fn handle_abort_command(
    engine: Arc<ExecEngine>,
    params: Parameters<AbortCommandInput>,
) -> Result<Json<ToolReply<AbortCommandOutput>>, McpError> {
    let result = engine
        .abort(params.0.tab_id.as_deref())
        .map(|aborted_sessions| AbortCommandOutput { aborted_sessions });

    Ok(Json(ToolReply::from_result(result, |out| {
        format!(
            "Abort requested for {} command(s). The running program is left alone; use interrupt_command to stop it.",
            out.aborted_sessions.len()
        )
    })))
}
