//! Reply envelope shared by all tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{Result, TerminalError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Outcome of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Envelope every tool returns. Failures are reported here rather than as protocol errors.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolReply<T> {
    /// `ok` or `error`.
    pub status: ReplyStatus,

    /// Human readable summary.
    pub message: String,

    /// Stable error code when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Tool specific payload when `status` is `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<T> ToolReply<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ReplyStatus::Ok,
            message: message.into(),
            code: None,
            data: Some(data),
        }
    }

    pub fn error(err: &TerminalError) -> Self {
        tracing::debug!(code = err.code(), error = %err, "tool call failed");
        Self {
            status: ReplyStatus::Error,
            message: err.message(),
            code: Some(err.code().to_string()),
            data: None,
        }
    }

    /// Wrap a result, deriving the success message from the payload.
    pub fn from_result(result: Result<T>, message: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(data) => Self::ok(message(&data), data),
            Err(e) => Self::error(&e),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_shape() {
        let reply = ToolReply::ok("done", 5u32);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["data"], 5);
        assert!(json.get("code").is_none());
    }

    #[test]
    fn test_error_shape() {
        let reply: ToolReply<u32> = ToolReply::error(&TerminalError::NoSessions);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "NO_SESSIONS");
        assert!(json.get("data").is_none());
        assert!(!reply.is_ok());
    }

    #[test]
    fn test_timeout_message_names_output() {
        let err = TerminalError::CommandTimeout {
            timeout_ms: 1000,
            output_id: Some("out_abc".into()),
        };
        let reply: ToolReply<()> = ToolReply::error(&err);
        assert_eq!(reply.code.as_deref(), Some("COMMAND_TIMEOUT"));
        assert!(reply.message.contains("out_abc"));
    }
}
