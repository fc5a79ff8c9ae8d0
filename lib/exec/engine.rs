//! The command execution engine.
//!
//! One execution walks through these phases:
//!
//! 1. **Admission**: a command still running on the session is aborted and given a short grace
//!    period to release its slot.
//! 2. **Detection**: the prompt is cleared with a break, then a hidden reader (`stty -echo; read`)
//!    is armed and fed the detection script. The reader stays open for a second line.
//! 3. **Setup**: the shell's hook script is fed to the waiting reader, so it is never echoed or
//!    recorded in history.
//! 4. **Dispatch**: `echo "<start>" && <command>` is typed. The hook prints the end marker and
//!    the exit status at the next prompt.
//! 5. **Polling**: the buffer is scanned until both markers are visible, the command is aborted,
//!    or the timeout expires.
//! 6. **Cleanup**: another hidden reader removes the hook, whatever the outcome, and prints a
//!    done marker once echo is back on. The slot is released only after that marker shows up.
//!    A command that is still running holds the cleanup in the tty queue, so an unconfirmed
//!    cleanup is remembered and repeated by the next execution on that terminal, right after
//!    its break has cleared the queue.
//!
//! The output is then stored, and the caller receives at most a configured number of lines.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ExecConfig;
use crate::host::TerminalHost;
use crate::session::{Session, SessionRegistry};
use crate::shell::{count_reports, detect_type, detection_script, ShellKind, ShellRegistry};
use crate::terminal::{strip_ansi, PromptDetector};
use crate::types::{Result, TerminalError};

use super::active::{ActiveCommandTracker, ActiveSlot, CommandPhase};
use super::frame::{self, Frame, FrameScan, MarkerClock, Markers};
use super::store::{OutputStore, StoredOutput};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Break character (Ctrl+C).
const BREAK: &str = "\x03";

/// Hidden reader that evaluates the detection script and then the setup script.
const SETUP_READER: &str =
    "stty -echo; read -r __exec_ds; eval \"$__exec_ds\"; read -r __exec_ss; eval \"$__exec_ss\"; stty echo";

/// Hidden reader that evaluates the cleanup script, then prints the done marker the script set.
const CLEANUP_READER: &str = "stty -echo; read -r __exec_cs; eval \"$__exec_cs\"; stty echo; \
     echo \"$__exec_cd\"; unset __exec_cs __exec_cd";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A command to execute.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    /// Shell command line. May span several lines.
    pub command: String,

    /// Target session id; the focused session when absent.
    pub tab_id: Option<String>,

    /// Why the command is run. Logged only.
    pub explanation: Option<String>,

    /// Overrides the configured timeout.
    pub timeout_ms: Option<u64>,
}

/// Result of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutcome {
    /// Command output, possibly truncated.
    pub output: String,

    /// Prompt that preceded the command.
    pub prompt_shell: Option<String>,

    /// Exit status; absent when aborted.
    pub exit_code: Option<i32>,

    /// Whether the command was aborted before it finished.
    pub aborted: bool,

    /// Id of the stored full output.
    pub output_id: String,

    /// Summary for the caller.
    pub message: String,

    /// Detected shell family.
    pub shell_type: String,

    /// Number of lines in the full output.
    pub total_lines: usize,

    /// Whether `output` holds only the first part of the full output.
    pub truncated: bool,

    /// Session the command ran in.
    pub session_id: usize,
}

/// Drives commands through host terminals.
#[derive(Debug)]
pub struct ExecEngine {
    sessions: SessionRegistry,
    tracker: Arc<ActiveCommandTracker>,
    store: OutputStore,
    shells: ShellRegistry,
    clock: MarkerClock,
    prompts: PromptDetector,
    pending: Mutex<HashMap<usize, PendingCleanup>>,
    config: ExecConfig,
}

/// A cleanup that was sent but never reported back.
#[derive(Debug, Clone)]
struct PendingCleanup {
    shell: ShellKind,
    done: String,
}

/// How the polling phase ended.
enum Finish {
    Complete(Frame),
    Aborted(String),
    TimedOut(String),
}

/// Facts gathered along the way that cleanup depends on.
struct Progress {
    shell: ShellKind,
    setup_sent: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ExecEngine {
    /// Create an engine over a host.
    pub fn new(host: Arc<dyn TerminalHost>, config: ExecConfig) -> Result<Self> {
        Ok(Self {
            sessions: SessionRegistry::new(host),
            tracker: Arc::new(ActiveCommandTracker::new()),
            store: OutputStore::new(config.output_store_capacity),
            shells: ShellRegistry::new(),
            clock: MarkerClock::new(),
            prompts: PromptDetector::new(&config.prompt_pattern)?,
            pending: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn tracker(&self) -> &Arc<ActiveCommandTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Run a command to completion, abort, or timeout.
    pub async fn exec(&self, request: ExecRequest) -> Result<ExecOutcome> {
        let command = request.command.replace("\r\n", "\n").trim().to_string();
        if command.is_empty() {
            return Err(TerminalError::EmptyCommand);
        }

        let sessions = self.sessions.list_sessions();
        let session = self
            .sessions
            .resolve(&sessions, request.tab_id.as_deref())?;
        // Fail before touching the terminal if its buffer cannot be read.
        self.sessions.buffer_text(&session)?;

        self.admit(session.id).await;
        let slot = self.tracker.acquire(session.id, &command, self.clock.next())?;
        let markers = slot.markers().clone();
        let timeout = request.timeout_ms.unwrap_or(self.config.command_timeout_ms);

        tracing::info!(
            session_id = session.id,
            command = %command,
            explanation = request.explanation.as_deref().unwrap_or(""),
            timeout_ms = timeout,
            "executing command"
        );

        let mut progress = Progress {
            shell: self.shells.fallback(),
            setup_sent: false,
        };
        let finish = self
            .drive(
                &session,
                &slot,
                &command,
                Duration::from_millis(timeout),
                &mut progress,
            )
            .await;

        if progress.setup_sent {
            slot.set_phase(CommandPhase::Cleanup);
            // Only a completed command is sure to have handed the terminal back to the shell.
            let wait = match &finish {
                Ok(Finish::Complete(_)) => self.config.cleanup_timeout(),
                _ => self.config.settle_delay(),
            };
            self.finish_cleanup(&session, progress.shell, &markers.done, wait)
                .await;
        }

        slot.set_phase(match &finish {
            Ok(Finish::Complete(_)) => CommandPhase::Completed,
            Ok(Finish::Aborted(_)) => CommandPhase::Aborted,
            _ => CommandPhase::Failed,
        });
        drop(slot);

        let shell = progress.shell;
        match finish {
            Ok(Finish::Complete(frame)) => {
                tracing::info!(
                    session_id = session.id,
                    %shell,
                    exit_code = ?frame.exit_code,
                    "command completed"
                );
                let record = StoredOutput::new(
                    session.id,
                    &command,
                    frame.output,
                    frame.exit_code,
                    frame.prompt,
                    false,
                );
                Ok(self.respond(record, shell))
            }
            Ok(Finish::Aborted(partial)) => {
                tracing::info!(session_id = session.id, %shell, "command aborted");
                let record = StoredOutput::new(session.id, &command, partial, None, None, true);
                Ok(self.respond(record, shell))
            }
            Ok(Finish::TimedOut(partial)) => {
                tracing::warn!(session_id = session.id, %shell, timeout_ms = timeout, "command timed out");
                let record = StoredOutput::new(session.id, &command, partial, None, None, true);
                let output_id = self.store.store(record);
                Err(TerminalError::CommandTimeout {
                    timeout_ms: timeout,
                    output_id: Some(output_id),
                })
            }
            Err(e) => {
                tracing::error!(session_id = session.id, error = %e, "command failed");
                Err(e)
            }
        }
    }

    /// Request an abort. Without a tab id every running command is aborted.
    ///
    /// Returns the ids of the sessions whose commands were flagged.
    pub fn abort(&self, tab_id: Option<&str>) -> Result<Vec<usize>> {
        match tab_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                let sessions = self.sessions.list_sessions();
                let session = self.sessions.resolve(&sessions, Some(id))?;
                if self.tracker.abort(session.id) {
                    Ok(vec![session.id])
                } else {
                    Err(TerminalError::NoCommandRunning)
                }
            }
            None => {
                let ids = self.tracker.abort_all();
                if ids.is_empty() {
                    Err(TerminalError::NoCommandRunning)
                } else {
                    Ok(ids)
                }
            }
        }
    }

    /// Send the break character to a session.
    pub async fn interrupt(&self, tab_id: Option<&str>) -> Result<Session> {
        let sessions = self.sessions.list_sessions();
        let session = self.sessions.resolve(&sessions, tab_id)?;
        send(&session, BREAK.to_string()).await?;
        tracing::info!(session_id = session.id, "break sent");
        Ok(session)
    }

    /// Abort a command still holding the session and wait for it to let go.
    async fn admit(&self, session_id: usize) {
        if !self.tracker.is_running(session_id) {
            return;
        }

        tracing::warn!(session_id, "preempting running command");
        self.tracker.abort(session_id);

        let deadline = Instant::now() + self.config.preempt_grace();
        while self.tracker.is_running(session_id) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(remaining.min(self.config.poll_interval())).await;
        }
    }

    async fn drive(
        &self,
        session: &Session,
        slot: &ActiveSlot,
        command: &str,
        timeout: Duration,
        progress: &mut Progress,
    ) -> Result<Finish> {
        let markers = slot.markers().clone();

        slot.set_phase(CommandPhase::DetectingShell);
        let shell = self.detect(session, slot).await?;
        progress.shell = shell;
        tracing::debug!(session_id = session.id, %shell, "shell detected");

        // The hidden reader is waiting for this line; it must be sent even when aborting.
        send(session, line(&shell.setup_script(&markers.start, &markers.end))).await?;
        progress.setup_sent = true;
        tokio::time::sleep(self.config.settle_delay()).await;

        if slot.is_cancelled() {
            return Ok(Finish::Aborted(String::new()));
        }

        slot.set_phase(CommandPhase::AwaitingStart);
        let prefix = shell.command_prefix();
        send(session, dispatch_text(prefix, &markers.start, command)).await?;

        self.poll(session, slot, &markers, &format!("{}echo \"", prefix), timeout)
            .await
    }

    /// Run the detection script and resolve the shell family.
    async fn detect(&self, session: &Session, slot: &ActiveSlot) -> Result<ShellKind> {
        send(session, BREAK.to_string()).await?;
        tokio::time::sleep(self.config.settle_delay()).await;
        self.repeat_pending_cleanup(session).await?;

        let before = count_reports(&self.sessions.buffer_text(session)?);
        send(session, line(SETUP_READER)).await?;
        tokio::time::sleep(self.config.settle_delay()).await;
        send(session, line(&detection_script())).await?;

        let deadline = Instant::now() + self.config.detection_timeout();
        loop {
            let text = self.sessions.buffer_text(session)?;
            if count_reports(&text) > before {
                return Ok(self.shells.get(&detect_type(&text)));
            }
            if slot.is_cancelled() || Instant::now() >= deadline {
                tracing::warn!(session_id = session.id, "no shell detection report");
                return Ok(self.shells.fallback());
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn poll(
        &self,
        session: &Session,
        slot: &ActiveSlot,
        markers: &Markers,
        lead: &str,
        timeout: Duration,
    ) -> Result<Finish> {
        let started = Instant::now();
        loop {
            tokio::time::sleep(self.config.poll_interval()).await;

            let text = strip_ansi(&self.sessions.buffer_text(session)?);
            if slot.is_cancelled() {
                return Ok(Finish::Aborted(frame::extract_partial(&text, markers)));
            }

            match frame::scan(&text, markers, lead, &self.prompts) {
                FrameScan::Complete(frame) => {
                    slot.set_phase(CommandPhase::Extracting);
                    return Ok(Finish::Complete(frame));
                }
                FrameScan::Started => slot.set_phase(CommandPhase::AwaitingEnd),
                FrameScan::NotStarted => {}
            }

            if started.elapsed() >= timeout {
                return Ok(Finish::TimedOut(frame::extract_partial(&text, markers)));
            }
        }
    }

    /// Remove the hook and record whether the shell confirmed it. Failures are logged, never
    /// surfaced.
    async fn finish_cleanup(
        &self,
        session: &Session,
        shell: ShellKind,
        done: &str,
        wait: Duration,
    ) {
        let confirmed = match self.cleanup(session, shell, done, wait).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                tracing::warn!(session_id = session.id, %shell, error = %e, "cleanup failed");
                false
            }
        };

        let key = tab_key(session);
        if confirmed {
            self.lock_pending().remove(&key);
        } else {
            tracing::debug!(session_id = session.id, %shell, "cleanup not confirmed yet");
            self.lock_pending().insert(
                key,
                PendingCleanup {
                    shell,
                    done: done.to_string(),
                },
            );
        }
    }

    /// Repeat a cleanup the previous execution could not confirm. Runs after the break, which
    /// flushes whatever was still queued.
    async fn repeat_pending_cleanup(&self, session: &Session) -> Result<()> {
        let pending = self.lock_pending().remove(&tab_key(session));
        let Some(pending) = pending else {
            return Ok(());
        };

        let text = strip_ansi(&self.sessions.buffer_text(session)?);
        if has_line(&text, &pending.done) {
            return Ok(());
        }

        tracing::info!(session_id = session.id, shell = %pending.shell, "repeating cleanup");
        let wait = self.config.cleanup_timeout();
        if !self.cleanup(session, pending.shell, &pending.done, wait).await? {
            tracing::warn!(
                session_id = session.id,
                shell = %pending.shell,
                "cleanup not confirmed"
            );
        }
        Ok(())
    }

    /// Feed the cleanup script to a hidden reader and wait up to `wait` for its done marker.
    ///
    /// The script goes out only after the reader has turned echo off, so it never shows up.
    async fn cleanup(
        &self,
        session: &Session,
        shell: ShellKind,
        done: &str,
        wait: Duration,
    ) -> Result<bool> {
        send(session, line(CLEANUP_READER)).await?;
        tokio::time::sleep(self.config.settle_delay()).await;
        let script = format!("{}; __exec_cd=\"{}\"", shell.cleanup_script(), done);
        send(session, line(&script)).await?;

        let deadline = Instant::now() + wait;
        loop {
            let text = strip_ansi(&self.sessions.buffer_text(session)?);
            if has_line(&text, done) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<usize, PendingCleanup>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store the record and shape the caller's view of it.
    fn respond(&self, record: StoredOutput, shell: ShellKind) -> ExecOutcome {
        let max = self.config.max_lines_per_response;
        let lines = record.lines();
        let total_lines = lines.len();
        let truncated = total_lines > max;

        let output = if truncated {
            format!("{}\n...", lines[..max].join("\n"))
        } else {
            record.output.clone()
        };

        let outcome = ExecOutcome {
            output,
            prompt_shell: record.prompt_shell.clone(),
            exit_code: record.exit_code,
            aborted: record.aborted,
            output_id: record.id.clone(),
            message: String::new(),
            shell_type: shell.id().to_string(),
            total_lines,
            truncated,
            session_id: record.session_id,
        };
        self.store.store(record);

        let message = match (outcome.aborted, truncated) {
            (_, true) => format!(
                "Output truncated: showing {} of {} lines. Use get_command_output with outputId {} to read the rest.",
                max, total_lines, outcome.output_id
            ),
            (true, false) => "Command aborted before it finished.".to_string(),
            (false, false) => "Command completed.".to_string(),
        };
        ExecOutcome { message, ..outcome }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Type text into a session off the async runtime.
async fn send(session: &Session, text: String) -> Result<()> {
    let tab = session.tab.clone();
    tokio::task::spawn_blocking(move || tab.send_input(&text))
        .await
        .map_err(|e| TerminalError::Host(e.to_string()))?
}

fn line(script: &str) -> String {
    format!("{}\n", script)
}

/// Identifies the terminal behind a session, which outlives session ids.
fn tab_key(session: &Session) -> usize {
    Arc::as_ptr(&session.tab) as *const () as usize
}

/// Whether some line of `text` is exactly `marker`. Echoed input never is.
fn has_line(text: &str, marker: &str) -> bool {
    text.lines().any(|l| l.trim() == marker)
}

/// The text typed to run `command`, announcing it with the start marker.
///
/// Multi-line commands run as one brace group so the shell sees a single unit.
pub fn dispatch_text(prefix: &str, start: &str, command: &str) -> String {
    if command.contains('\n') {
        format!("{}echo \"{}\" && {{\n{}\n}}\n", prefix, start, command)
    } else {
        format!("{}echo \"{}\" && {}\n", prefix, start, command)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
