//! Shared types and error definitions for the terminal exec server.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types: Error
//--------------------------------------------------------------------------------------------------

/// Terminal exec error types.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("A command is already running in session {0}. Abort it first.")]
    CommandAlreadyRunning(usize),

    #[error("No terminal sessions available")]
    NoSessions,

    #[error("No terminal session found with ID {0}")]
    SessionNotFound(String),

    #[error("Command timed out after {timeout_ms}ms without returning to the prompt")]
    CommandTimeout {
        timeout_ms: u64,
        output_id: Option<String>,
    },

    #[error("No terminal frontend available for session {0}")]
    FrontendUnavailable(usize),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Command output with ID {0} not found")]
    OutputNotFound(String),

    #[error("Command must not be empty")]
    EmptyCommand,

    #[error("No command is currently running")]
    NoCommandRunning,

    #[error("Invalid line range: {0}")]
    InvalidLineRange(String),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Maximum terminals reached ({0})")]
    MaxSessionsReached(usize),

    #[error("Invalid prompt pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TerminalError {
    /// Get the error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CommandAlreadyRunning(_) => "COMMAND_ALREADY_RUNNING",
            Self::NoSessions => "NO_SESSIONS",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::CommandTimeout { .. } => "COMMAND_TIMEOUT",
            Self::FrontendUnavailable(_) => "FRONTEND_UNAVAILABLE",
            Self::Host(_) => "HOST_ERROR",
            Self::OutputNotFound(_) => "OUTPUT_NOT_FOUND",
            Self::EmptyCommand => "EMPTY_COMMAND",
            Self::NoCommandRunning => "NO_COMMAND_RUNNING",
            Self::InvalidLineRange(_) => "INVALID_LINE_RANGE",
            Self::Pty(_) => "PTY_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::MaxSessionsReached(_) => "MAX_SESSIONS",
            Self::InvalidPattern(_) => "INVALID_PATTERN",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Human readable message, including follow-up hints where the caller can act on them.
    pub fn message(&self) -> String {
        match self {
            Self::CommandTimeout {
                output_id: Some(id),
                ..
            } => format!(
                "{}. Partial output stored with ID: {}. Use get_command_output to retrieve it.",
                self, id
            ),
            Self::NoSessions => format!("{}. Open a terminal first.", self),
            Self::SessionNotFound(_) => {
                format!("{}. Use list_sessions to find valid IDs.", self)
            }
            _ => self.to_string(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Types: Common
//--------------------------------------------------------------------------------------------------

/// Terminal dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub rows: u16,
    pub cols: u16,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Output format for terminal buffer content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Strip ANSI codes, return plain text.
    #[default]
    Plain,
    /// Preserve ANSI codes.
    Raw,
}

/// Result type for terminal operations.
pub type Result<T> = std::result::Result<T, TerminalError>;
