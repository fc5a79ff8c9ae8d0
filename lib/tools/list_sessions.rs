//! list_sessions tool implementation.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exec::{ActiveSnapshot, ExecEngine};

use super::ToolReply;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A terminal session as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id, valid until the tab layout changes.
    pub id: usize,

    /// Tab title.
    pub title: String,

    /// Whether the tab has focus.
    pub has_focus: bool,

    /// Command currently running in the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_command: Option<ActiveSnapshot>,
}

/// Output for list_sessions tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListSessionsOutput {
    /// Sessions in discovery order.
    pub sessions: Vec<SessionSummary>,

    /// Number of sessions.
    pub count: usize,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Handle the list_sessions tool call.
pub async fn handle_list_sessions(
    engine: Arc<ExecEngine>,
) -> Result<Json<ToolReply<ListSessionsOutput>>, McpError> {
    let sessions: Vec<SessionSummary> = engine
        .sessions()
        .list_sessions()
        .into_iter()
        .map(|s| SessionSummary {
            active_command: engine.tracker().get_active(s.id),
            id: s.id,
            title: s.title,
            has_focus: s.has_focus,
        })
        .collect();

    let count = sessions.len();
    Ok(Json(ToolReply::ok(
        format!("Found {} terminal session(s)", count),
        ListSessionsOutput { sessions, count },
    )))
}
