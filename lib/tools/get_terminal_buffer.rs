//! get_terminal_buffer tool implementation.
//!
//! Lines are counted from the bottom of the buffer, skipping blank lines: line 1 is the last
//! non-blank line.

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::exec::ExecEngine;
use crate::terminal::strip_ansi;
use crate::types::{self, OutputFormat, TerminalError};

use super::ToolReply;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Input for get_terminal_buffer tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetTerminalBufferInput {
    /// Session id from list_sessions.
    pub tab_id: String,

    /// First line to return, counted from the bottom (default 1).
    #[serde(default = "default_start_line")]
    pub start_line: i64,

    /// Last line to return, counted from the bottom; -1 for as many as allowed (default -1).
    #[serde(default = "default_end_line")]
    pub end_line: i64,

    /// Output format: "plain" or "raw".
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output for get_terminal_buffer tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetTerminalBufferOutput {
    /// Selected lines, oldest first.
    pub content: String,

    /// Non-blank lines in the buffer.
    pub total_lines: usize,

    /// First returned line, counted from the bottom.
    pub start_line: usize,

    /// Last returned line, counted from the bottom.
    pub end_line: usize,

    pub format: OutputFormat,
}

/// Selected region of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferWindow {
    pub lines: Vec<String>,
    pub total_lines: usize,
    pub start_line: usize,
    pub end_line: usize,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn default_start_line() -> i64 {
    1
}

fn default_end_line() -> i64 {
    -1
}

/// Select lines `start_line..=end_line` counted from the bottom, at most `max` of them.
pub fn buffer_window(
    text: &str,
    start_line: i64,
    end_line: i64,
    max: usize,
) -> types::Result<BufferWindow> {
    if start_line < 1 {
        return Err(TerminalError::InvalidLineRange(
            "startLine must be at least 1".into(),
        ));
    }
    if end_line != -1 && end_line < start_line {
        return Err(TerminalError::InvalidLineRange(format!(
            "endLine {} is before startLine {}",
            end_line, start_line
        )));
    }

    let lines: Vec<&str> = text
        .split('\n')
        .filter(|l| !strip_ansi(l).trim().is_empty())
        .collect();
    let total = lines.len();

    if total == 0 {
        return Ok(BufferWindow {
            lines: Vec::new(),
            total_lines: 0,
            start_line: 0,
            end_line: 0,
        });
    }

    let start = start_line as usize;
    if start > total {
        return Err(TerminalError::InvalidLineRange(format!(
            "startLine {} exceeds the {} lines in the buffer",
            start, total
        )));
    }

    let max = max.max(1);
    let hi = total - (start - 1);
    let lo = if end_line == -1 {
        hi.saturating_sub(max)
    } else {
        total.saturating_sub(end_line as usize)
    }
    .max(hi.saturating_sub(max));

    Ok(BufferWindow {
        lines: lines[lo..hi].iter().map(|l| l.to_string()).collect(),
        total_lines: total,
        start_line: start,
        end_line: start + (hi - lo) - 1,
    })
}

/// Handle the get_terminal_buffer tool call.
pub async fn handle_get_terminal_buffer(
    engine: Arc<ExecEngine>,
    params: Parameters<GetTerminalBufferInput>,
) -> Result<Json<ToolReply<GetTerminalBufferOutput>>, McpError> {
    let input = params.0;
    let max = engine.config().max_buffer_lines;

    let result = (|| -> types::Result<GetTerminalBufferOutput> {
        let registry = engine.sessions();
        let sessions = registry.list_sessions();
        let session = registry.resolve(&sessions, Some(input.tab_id.as_str()))?;
        let raw = registry.buffer_text(&session)?;
        let text = match input.format {
            OutputFormat::Plain => strip_ansi(&raw),
            OutputFormat::Raw => raw,
        };
        let window = buffer_window(&text, input.start_line, input.end_line, max)?;
        Ok(GetTerminalBufferOutput {
            content: window.lines.join("\n"),
            total_lines: window.total_lines,
            start_line: window.start_line,
            end_line: window.end_line,
            format: input.format,
        })
    })();

    Ok(Json(ToolReply::from_result(result, |out| {
        format!(
            "Lines {}-{} from the bottom of {} non-blank lines",
            out.start_line, out.end_line, out.total_lines
        )
    })))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("l{}", i)).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_last_lines() {
        let w = buffer_window(&numbered(10), 1, 3, 200).unwrap();
        assert_eq!(w.lines, ["l8", "l9", "l10"]);
        assert_eq!((w.start_line, w.end_line, w.total_lines), (1, 3, 10));
    }

    #[test]
    fn test_offset_from_bottom() {
        let w = buffer_window(&numbered(10), 2, 4, 200).unwrap();
        assert_eq!(w.lines, ["l7", "l8", "l9"]);
    }

    #[test]
    fn test_open_end_is_capped() {
        let w = buffer_window(&numbered(500), 1, -1, 200).unwrap();
        assert_eq!(w.lines.len(), 200);
        assert_eq!(w.lines.last().map(String::as_str), Some("l500"));
        assert_eq!(w.end_line, 200);

        let w = buffer_window(&numbered(500), 1, 450, 200).unwrap();
        assert_eq!(w.lines.len(), 200);
    }

    #[test]
    fn test_end_beyond_total() {
        let w = buffer_window(&numbered(5), 1, 50, 200).unwrap();
        assert_eq!(w.lines.len(), 5);
        assert_eq!(w.end_line, 5);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let w = buffer_window("a\n\n  \nb\n\n", 1, -1, 200).unwrap();
        assert_eq!(w.lines, ["a", "b"]);
        assert_eq!(w.total_lines, 2);
    }

    #[test]
    fn test_invalid_ranges() {
        let text = numbered(5);
        assert!(buffer_window(&text, 0, -1, 200).is_err());
        assert!(buffer_window(&text, 3, 2, 200).is_err());
        let err = buffer_window(&text, 6, -1, 200).unwrap_err();
        assert_eq!(err.code(), "INVALID_LINE_RANGE");
    }

    #[test]
    fn test_empty_buffer() {
        let w = buffer_window("\n\n", 1, -1, 200).unwrap();
        assert!(w.lines.is_empty());
        assert_eq!(w.total_lines, 0);
    }
}
