//! A terminal tab backed by a local PTY.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::host::{TerminalFrontend, TerminalTab};
use crate::terminal::Transcript;
use crate::types::{Result, TerminalError};

use super::pty::{PtyProcess, SpawnSpec};
use super::reader::{Capture, OutputPump};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A running local terminal.
pub struct LocalTab {
    key: String,
    title: String,
    program: String,
    focused: AtomicBool,
    process: Mutex<PtyProcess>,
    frontend: Arc<LocalFrontend>,
    pump: OutputPump,
}

/// Buffer access for a [`LocalTab`].
#[derive(Debug)]
pub struct LocalFrontend {
    capture: Arc<Mutex<Capture>>,
    serializer: AtomicBool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalTab {
    /// Spawn the process described by `spec` and start capturing its output.
    pub fn spawn(spec: &SpawnSpec, title: String, transcript_limit: usize) -> Result<Self> {
        let (process, source) = PtyProcess::spawn(spec)?;
        let capture = Arc::new(Mutex::new(Capture {
            transcript: Transcript::new(transcript_limit),
            error: None,
        }));
        let pump = OutputPump::spawn(source, capture.clone());

        tracing::info!(program = %spec.program, pid = ?process.pid(), "terminal spawned");

        Ok(Self {
            key: new_tab_key(),
            title,
            program: spec.program.clone(),
            focused: AtomicBool::new(false),
            process: Mutex::new(process),
            frontend: Arc::new(LocalFrontend {
                capture,
                serializer: AtomicBool::new(false),
            }),
            pump,
        })
    }

    /// Stable key of this tab.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Child process id.
    pub fn pid(&self) -> Option<u32> {
        self.lock_process().pid()
    }

    /// Whether the shell has exited and the PTY closed.
    pub fn is_closed(&self) -> bool {
        self.pump.is_closed()
    }

    /// Stop the child process. Blocks until it exits.
    pub fn terminate(&self, force: bool) -> Result<Option<i32>> {
        let result = self.lock_process().terminate(force);
        self.pump.shutdown();
        result
    }

    pub(crate) fn set_focus(&self, focused: bool) {
        self.focused.store(focused, Ordering::Relaxed);
    }

    fn lock_process(&self) -> std::sync::MutexGuard<'_, PtyProcess> {
        self.process.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl TerminalTab for LocalTab {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn has_focus(&self) -> bool {
        self.focused.load(Ordering::Relaxed)
    }

    fn send_input(&self, data: &str) -> Result<()> {
        if self.is_closed() {
            let capture = self.frontend.capture.lock().unwrap_or_else(|e| e.into_inner());
            return Err(TerminalError::Host(match &capture.error {
                Some(e) => format!("terminal {} has exited: {}", self.key, e),
                None => format!("terminal {} has exited", self.key),
            }));
        }
        self.lock_process().write(data.as_bytes())
    }

    fn frontend(&self) -> Option<Arc<dyn TerminalFrontend>> {
        // An exited terminal is no longer rendered.
        if self.is_closed() {
            return None;
        }
        Some(self.frontend.clone())
    }
}

impl TerminalFrontend for LocalFrontend {
    fn has_serializer(&self) -> bool {
        self.serializer.load(Ordering::Acquire)
    }

    fn attach_serializer(&self) -> Result<()> {
        self.serializer.store(true, Ordering::Release);
        Ok(())
    }

    fn serialize(&self) -> Result<String> {
        if !self.has_serializer() {
            return Err(TerminalError::Host("no serializer attached".into()));
        }
        let capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
        Ok(capture.transcript.render())
    }
}

impl std::fmt::Debug for LocalTab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTab")
            .field("key", &self.key)
            .field("title", &self.title)
            .field("program", &self.program)
            .field("closed", &self.is_closed())
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Generate a tab key: `tab_` followed by 8 hex characters.
pub fn new_tab_key() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("tab_{}", &id[..8])
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_tab_key_format() {
        let key = new_tab_key();
        assert!(key.starts_with("tab_"));
        assert_eq!(key.len(), 12);
        assert!(key[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tab_keys_unique() {
        let keys: HashSet<String> = (0..500).map(|_| new_tab_key()).collect();
        assert_eq!(keys.len(), 500);
    }

    #[test]
    fn test_serialize_requires_serializer() {
        let frontend = LocalFrontend {
            capture: Arc::new(Mutex::new(Capture {
                transcript: Transcript::new(10),
                error: None,
            })),
            serializer: AtomicBool::new(false),
        };
        assert!(frontend.serialize().is_err());

        frontend.attach_serializer().unwrap();
        frontend.attach_serializer().unwrap();
        assert!(frontend.has_serializer());
        assert_eq!(frontend.serialize().unwrap(), "");
    }
}
