//! get_command_output tool implementation.

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exec::{ExecEngine, OutputMetadata};

use super::ToolReply;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Input for get_command_output tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetCommandOutputInput {
    /// Id returned by exec_command.
    pub output_id: String,

    /// First line to return, 1-based (default 1).
    #[serde(default)]
    pub start_line: Option<usize>,

    /// Maximum lines to return (default 250).
    #[serde(default)]
    pub max_lines: Option<usize>,
}

/// Output for get_command_output tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetCommandOutputOutput {
    pub output_id: String,

    /// Requested lines joined with newlines.
    pub output: String,

    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub part: usize,
    pub total_parts: usize,
    pub metadata: OutputMetadata,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Handle the get_command_output tool call.
pub async fn handle_get_command_output(
    engine: Arc<ExecEngine>,
    params: Parameters<GetCommandOutputInput>,
) -> Result<Json<ToolReply<GetCommandOutputOutput>>, McpError> {
    let input = params.0;
    let max_lines = input
        .max_lines
        .unwrap_or(engine.config().max_lines_per_response);

    let result = engine
        .store()
        .page(&input.output_id, input.start_line.unwrap_or(1), max_lines)
        .map(|page| GetCommandOutputOutput {
            output_id: input.output_id.clone(),
            output: page.lines.join("\n"),
            start_line: page.start_line,
            end_line: page.end_line,
            total_lines: page.total_lines,
            part: page.part,
            total_parts: page.total_parts,
            metadata: page.metadata,
        });

    Ok(Json(ToolReply::from_result(result, |out| {
        if out.total_lines == 0 {
            return "[Output is empty]".to_string();
        }
        let mut message = format!(
            "[Showing part {}/{} (lines {}-{} of {})]",
            out.part, out.total_parts, out.start_line, out.end_line, out.total_lines
        );
        if out.end_line < out.total_lines {
            message.push_str(&format!(
                " Use startLine={} to read the next part.",
                out.end_line + 1
            ));
        }
        message
    })))
}
