//! Pseudo-terminal processes for the local host.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::types::{Dimensions, Result, TerminalError};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Variables never inherited by spawned shells.
const SENSITIVE_VARS: &[&str] = &[
    "SSH_AUTH_SOCK",
    "SSH_AGENT_PID",
    "GPG_AGENT_INFO",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "GITHUB_TOKEN",
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "HF_TOKEN",
];

/// Name fragments marking a variable as sensitive.
const SENSITIVE_FRAGMENTS: &[&str] = &["SECRET", "PASSWORD", "CREDENTIAL", "PRIVATE_KEY"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How to launch a terminal process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Program to run.
    pub program: String,

    /// Program arguments.
    pub args: Vec<String>,

    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Variables added on top of the filtered parent environment.
    pub env: HashMap<String, String>,

    /// Initial size.
    pub size: Dimensions,

    /// Value of `TERM`.
    pub term: String,
}

/// A child process attached to the slave side of a PTY.
pub struct PtyProcess {
    // Dropping the master hangs up the terminal.
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    size: Dimensions,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PtyProcess {
    /// Spawn the process. Returns it together with the master-side output reader.
    pub fn spawn(spec: &SpawnSpec) -> Result<(Self, Box<dyn Read + Send>)> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: spec.size.rows,
                cols: spec.size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        cmd.env_clear();
        for (key, value) in child_environment(&spec.env, &spec.term) {
            cmd.env(key, value);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.cwd(cwd);
        }

        let child = pair.slave.spawn_command(cmd).map_err(pty_error)?;
        // The slave end belongs to the child from here on.
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(pty_error)?;
        let writer = pair.master.take_writer().map_err(pty_error)?;

        Ok((
            Self {
                _master: pair.master,
                child,
                writer,
                size: spec.size,
            },
            reader,
        ))
    }

    /// Write input bytes to the terminal.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Exit code once the child has terminated.
    pub fn exit_code(&mut self) -> Option<i32> {
        self.child
            .try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code() as i32)
    }

    /// Child process id.
    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Stop the child. SIGHUP first, like a closing terminal window; SIGKILL when `force` is set.
    pub fn terminate(&mut self, force: bool) -> Result<Option<i32>> {
        if let Some(code) = self.exit_code() {
            return Ok(Some(code));
        }

        match self.child.process_id() {
            Some(pid) if !force => {
                // SAFETY: plain signal delivery to our own child.
                unsafe {
                    libc::kill(pid as i32, libc::SIGHUP);
                }
            }
            _ => self.child.kill().map_err(pty_error)?,
        }

        let status = self.child.wait().map_err(pty_error)?;
        Ok(Some(status.exit_code() as i32))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("size", &self.size)
            .field("pid", &self.child.process_id())
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Environment for a spawned shell: the parent's variables minus secrets, `TERM`, then `extra`.
pub fn child_environment(extra: &HashMap<String, String>, term: &str) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars()
        .filter(|(name, _)| !is_sensitive(name))
        .collect();
    env.insert("TERM".into(), term.into());
    env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

fn is_sensitive(name: &str) -> bool {
    if SENSITIVE_VARS.contains(&name) {
        return true;
    }
    let upper = name.to_uppercase();
    SENSITIVE_FRAGMENTS.iter().any(|f| upper.contains(f))
        || (upper.contains("API") && upper.contains("KEY"))
        || (upper.contains("AUTH") && upper.contains("TOKEN"))
}

fn pty_error(e: impl std::fmt::Display) -> TerminalError {
    TerminalError::Pty(e.to_string())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_names() {
        assert!(is_sensitive("GITHUB_TOKEN"));
        assert!(is_sensitive("DB_PASSWORD"));
        assert!(is_sensitive("MY_API_KEY"));
        assert!(is_sensitive("X_AUTH_TOKEN"));
        assert!(!is_sensitive("HOME"));
        assert!(!is_sensitive("PATH"));
        assert!(!is_sensitive("PS1"));
    }

    #[test]
    fn test_environment_layering() {
        let mut extra = HashMap::new();
        extra.insert("FOO".to_string(), "bar".to_string());
        let env = child_environment(&extra, "dumb");
        assert_eq!(env.get("TERM").map(String::as_str), Some("dumb"));
        assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));

        extra.insert("TERM".to_string(), "vt100".to_string());
        let env = child_environment(&extra, "dumb");
        assert_eq!(env.get("TERM").map(String::as_str), Some("vt100"));
    }

    #[test]
    fn test_spawn_and_read() {
        let spec = SpawnSpec {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), "echo pty-ok".into()],
            cwd: None,
            env: HashMap::new(),
            size: Dimensions::default(),
            term: "dumb".into(),
        };
        let (mut process, mut reader) = PtyProcess::spawn(&spec).unwrap();
        assert!(process.pid().is_some());

        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        while let Ok(n) = reader.read(&mut buf) {
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            if String::from_utf8_lossy(&out).contains("pty-ok") {
                break;
            }
        }
        assert!(String::from_utf8_lossy(&out).contains("pty-ok"));
        let _ = process.terminate(true);
    }
}
