//! interrupt_command tool implementation.

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

/// Input for interrupt_command tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterruptCommandInput {
    /// Session to interrupt. Defaults to the focused session.
    #[serde(default)]
    pub tab_id: Option<String>,
}

/// Output for interrupt_command tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterruptCommandOutput {
    /// Session that received the break.
    pub session_id: usize,

    /// Its title.
    pub title: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Handle the interrupt_command tool call.
pub async fn handle_interrupt_command(
    engine: Arc<ExecEngine>,
    params: Parameters<InterruptCommandInput>,
) -> Result<Json<ToolReply<InterruptCommandOutput>>, McpError> {
    let result = engine
        .interrupt(params.0.tab_id.as_deref())
        .await
        .map(|session| InterruptCommandOutput {
            session_id: session.id,
            title: session.title,
        });

    Ok(Json(ToolReply::from_result(result, |out| {
        format!("Sent Ctrl+C to session {}", out.session_id)
    })))
}
