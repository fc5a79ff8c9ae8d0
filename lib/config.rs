//! Configuration for the terminal exec server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Result, TerminalError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Global configuration for the terminal exec server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Command execution settings.
    pub exec: ExecConfig,

    /// Settings for terminals spawned by the local host.
    pub local: LocalHostConfig,
}

/// Timing and sizing knobs for the command execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Interval between buffer snapshots while waiting for markers.
    pub poll_interval_ms: u64,

    /// Delay after each injection before the buffer is inspected.
    pub settle_delay_ms: u64,

    /// How long to wait for a fresh shell detection report.
    pub detection_timeout_ms: u64,

    /// Wall-clock ceiling for one command.
    pub command_timeout_ms: u64,

    /// Grace period granted to a preempted command to release its slot.
    pub preempt_grace_ms: u64,

    /// How long to wait for a cleanup to report that it has run.
    pub cleanup_timeout_ms: u64,

    /// Maximum output lines returned directly by exec_command.
    pub max_lines_per_response: usize,

    /// Maximum lines returned by one get_terminal_buffer call.
    pub max_buffer_lines: usize,

    /// Number of stored outputs kept for paginated retrieval.
    pub output_store_capacity: usize,

    /// Regex used to recognise prompt text when the command echo cannot be split.
    pub prompt_pattern: String,
}

/// Defaults for terminals opened through the local PTY host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalHostConfig {
    /// Default number of rows for new terminals.
    pub default_rows: u16,

    /// Default number of columns for new terminals.
    pub default_cols: u16,

    /// Default shell for new terminals.
    pub default_shell: String,

    /// Terminal type for TERM environment variable.
    pub term: String,

    /// Maximum lines kept in each terminal transcript.
    pub transcript_limit: usize,

    /// Maximum number of concurrent terminals.
    pub max_sessions: usize,

    /// Open one terminal with the default shell at startup.
    pub open_on_start: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl GlobalConfig {
    /// Load configuration from a JSON file, filling missing fields with defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| TerminalError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.exec.poll_interval_ms == 0 {
            return Err(TerminalError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.exec.max_lines_per_response == 0 || self.exec.max_buffer_lines == 0 {
            return Err(TerminalError::Config("line limits must be > 0".into()));
        }
        if self.exec.output_store_capacity == 0 {
            return Err(TerminalError::Config(
                "output_store_capacity must be > 0".into(),
            ));
        }
        regex::Regex::new(&self.exec.prompt_pattern)?;
        Ok(())
    }
}

impl ExecConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    pub fn preempt_grace(&self) -> Duration {
        Duration::from_millis(self.preempt_grace_ms)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            exec: ExecConfig::default(),
            local: LocalHostConfig::default(),
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            settle_delay_ms: 100,
            detection_timeout_ms: 2000,
            command_timeout_ms: 30_000,
            preempt_grace_ms: 1000,
            cleanup_timeout_ms: 2000,
            max_lines_per_response: 250,
            max_buffer_lines: 200,
            output_store_capacity: 100,
            prompt_pattern: r"^(.*?[$#%>])\s".into(),
        }
    }
}

impl Default for LocalHostConfig {
    fn default() -> Self {
        Self {
            default_rows: 24,
            default_cols: 80,
            default_shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".into()),
            term: "xterm-256color".into(),
            transcript_limit: 10000,
            max_sessions: 10,
            open_on_start: true,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GlobalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exec.max_lines_per_response, 250);
        assert_eq!(config.exec.command_timeout_ms, 30_000);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "exec": {{ "command_timeout_ms": 5000 }} }}"#).unwrap();

        let config = GlobalConfig::from_file(file.path()).unwrap();
        assert_eq!(config.exec.command_timeout_ms, 5000);
        assert_eq!(config.exec.poll_interval_ms, 100);
        assert_eq!(config.local.default_rows, 24);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = GlobalConfig::default();
        config.exec.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = GlobalConfig::default();
        config.exec.prompt_pattern = "(".into();
        assert!(matches!(
            config.validate(),
            Err(TerminalError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = GlobalConfig::from_file(file.path()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
