//! open_terminal tool implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exec::ExecEngine;
use crate::host::{LocalHost, OpenOptions};
use crate::types::{self, TerminalError};

use super::ToolReply;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Input for open_terminal tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenTerminalInput {
    /// Program to run (default: the configured shell).
    #[serde(default)]
    pub program: Option<String>,

    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Additional environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Terminal rows.
    #[serde(default)]
    pub rows: Option<u16>,

    /// Terminal columns.
    #[serde(default)]
    pub cols: Option<u16>,

    /// Session id to split; the new terminal joins that tab's split group.
    #[serde(default)]
    pub split: Option<String>,

    /// Tab title (default: program name).
    #[serde(default)]
    pub title: Option<String>,
}

/// Output for open_terminal tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenTerminalOutput {
    /// Session id of the new terminal.
    pub tab_id: usize,

    pub title: String,
    pub program: String,
    pub pid: Option<u32>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Handle the open_terminal tool call.
pub async fn handle_open_terminal(
    engine: Arc<ExecEngine>,
    host: Arc<LocalHost>,
    params: Parameters<OpenTerminalInput>,
) -> Result<Json<ToolReply<OpenTerminalOutput>>, McpError> {
    let result = open(&engine, &host, params.0);
    Ok(Json(ToolReply::from_result(result, |out| {
        format!("Opened {} as session {}", out.title, out.tab_id)
    })))
}

fn open(
    engine: &ExecEngine,
    host: &LocalHost,
    input: OpenTerminalInput,
) -> types::Result<OpenTerminalOutput> {
    let registry = engine.sessions();

    let split = match input.split.as_deref() {
        Some(id) => {
            let sessions = registry.list_sessions();
            let session = registry.resolve(&sessions, Some(id))?;
            let key = host
                .key_of(&session.tab)
                .ok_or_else(|| TerminalError::SessionNotFound(id.to_string()))?;
            Some(key)
        }
        None => None,
    };

    let opened = host.open(OpenOptions {
        program: input.program,
        args: input.args,
        cwd: input.cwd,
        env: input.env,
        rows: input.rows,
        cols: input.cols,
        title: input.title,
        split,
    })?;

    let tab_id = registry
        .list_sessions()
        .into_iter()
        .find(|s| host.key_of(&s.tab).as_deref() == Some(opened.key.as_str()))
        .map(|s| s.id)
        .ok_or_else(|| TerminalError::Host("opened terminal is not listed".into()))?;

    Ok(OpenTerminalOutput {
        tab_id,
        title: opened.title,
        program: opened.program,
        pid: opened.pid,
    })
}
