//! Tracking of in-flight commands, one per session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::types::{Result, TerminalError};

use super::frame::Markers;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where an execution currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CommandPhase {
    Idle,
    DetectingShell,
    AwaitingStart,
    AwaitingEnd,
    Extracting,
    Cleanup,
    Completed,
    Aborted,
    Failed,
}

/// An in-flight command.
#[derive(Debug, Clone)]
pub struct ActiveCommand {
    pub session_id: usize,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub markers: Markers,
    pub phase: CommandPhase,
    cancel: Arc<AtomicBool>,
}

/// Published view of an in-flight command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSnapshot {
    pub session_id: usize,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub phase: CommandPhase,
    pub abort_requested: bool,
}

/// Registry of in-flight commands keyed by session id.
///
/// Every change is published on a watch channel as the full list of snapshots.
#[derive(Debug)]
pub struct ActiveCommandTracker {
    slots: Mutex<HashMap<usize, ActiveCommand>>,
    changes: watch::Sender<Vec<ActiveSnapshot>>,
}

/// Ownership of a session's slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct ActiveSlot {
    tracker: Arc<ActiveCommandTracker>,
    session_id: usize,
    markers: Markers,
    cancel: Arc<AtomicBool>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ActiveCommand {
    pub fn new(session_id: usize, command: impl Into<String>, markers: Markers) -> Self {
        Self {
            session_id,
            command: command.into(),
            started_at: Utc::now(),
            markers,
            phase: CommandPhase::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether an abort was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> ActiveSnapshot {
        ActiveSnapshot {
            session_id: self.session_id,
            command: self.command.clone(),
            started_at: self.started_at,
            phase: self.phase,
            abort_requested: self.is_cancelled(),
        }
    }
}

impl ActiveCommandTracker {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            slots: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Register a command. Fails when the session already has one.
    pub fn set_active(&self, command: ActiveCommand) -> Result<()> {
        let mut slots = self.lock();
        if slots.contains_key(&command.session_id) {
            return Err(TerminalError::CommandAlreadyRunning(command.session_id));
        }
        slots.insert(command.session_id, command);
        self.publish(&slots);
        Ok(())
    }

    /// Register a command and return the guard owning its slot.
    pub fn acquire(
        self: &Arc<Self>,
        session_id: usize,
        command: &str,
        markers: Markers,
    ) -> Result<ActiveSlot> {
        let active = ActiveCommand::new(session_id, command, markers.clone());
        let cancel = active.cancel.clone();
        self.set_active(active)?;
        Ok(ActiveSlot {
            tracker: self.clone(),
            session_id,
            markers,
            cancel,
        })
    }

    /// Snapshot of the session's command, if any.
    pub fn get_active(&self, session_id: usize) -> Option<ActiveSnapshot> {
        self.lock().get(&session_id).map(ActiveCommand::snapshot)
    }

    pub fn is_running(&self, session_id: usize) -> bool {
        self.lock().contains_key(&session_id)
    }

    /// Snapshots of every in-flight command, ordered by session id.
    pub fn all(&self) -> Vec<ActiveSnapshot> {
        snapshots(&self.lock())
    }

    /// Remove the session's entry unconditionally.
    pub fn clear(&self, session_id: usize) -> bool {
        let mut slots = self.lock();
        let removed = slots.remove(&session_id).is_some();
        if removed {
            self.publish(&slots);
        }
        removed
    }

    /// Remove the session's entry only if it still belongs to the execution using `start_marker`.
    pub fn clear_if(&self, session_id: usize, start_marker: &str) -> bool {
        let mut slots = self.lock();
        let owned = slots
            .get(&session_id)
            .is_some_and(|c| c.markers.start == start_marker);
        if owned {
            slots.remove(&session_id);
            self.publish(&slots);
        }
        owned
    }

    /// Request an abort. Returns whether a command was running.
    pub fn abort(&self, session_id: usize) -> bool {
        let slots = self.lock();
        let Some(command) = slots.get(&session_id) else {
            return false;
        };
        command.cancel.store(true, Ordering::Release);
        tracing::info!(session_id, command = %command.command, "abort requested");
        self.publish(&slots);
        true
    }

    /// Request an abort of every in-flight command. Returns the affected session ids.
    pub fn abort_all(&self) -> Vec<usize> {
        let slots = self.lock();
        let mut ids: Vec<usize> = slots.keys().copied().collect();
        ids.sort_unstable();
        for command in slots.values() {
            command.cancel.store(true, Ordering::Release);
        }
        if !ids.is_empty() {
            tracing::info!(sessions = ?ids, "abort requested for all commands");
            self.publish(&slots);
        }
        ids
    }

    /// Record a phase transition for the execution using `start_marker`.
    pub fn set_phase(&self, session_id: usize, start_marker: &str, phase: CommandPhase) {
        let mut slots = self.lock();
        if let Some(command) = slots
            .get_mut(&session_id)
            .filter(|c| c.markers.start == start_marker)
        {
            if command.phase != phase {
                tracing::debug!(session_id, ?phase, "phase transition");
                command.phase = phase;
                self.publish(&slots);
            }
        }
    }

    /// Receiver of the snapshot list, updated on every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ActiveSnapshot>> {
        self.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, ActiveCommand>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, slots: &HashMap<usize, ActiveCommand>) {
        self.changes.send_replace(snapshots(slots));
    }
}

impl ActiveSlot {
    pub fn session_id(&self) -> usize {
        self.session_id
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn set_phase(&self, phase: CommandPhase) {
        self.tracker
            .set_phase(self.session_id, &self.markers.start, phase);
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ActiveCommandTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.tracker.clear_if(self.session_id, &self.markers.start);
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn snapshots(slots: &HashMap<usize, ActiveCommand>) -> Vec<ActiveSnapshot> {
    let mut list: Vec<ActiveSnapshot> = slots.values().map(ActiveCommand::snapshot).collect();
    list.sort_by_key(|s| s.session_id);
    list
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> Arc<ActiveCommandTracker> {
        Arc::new(ActiveCommandTracker::new())
    }

    #[test]
    fn test_one_command_per_session() {
        let tracker = tracker();
        let _slot = tracker.acquire(0, "sleep 1", Markers::from_micros(1)).unwrap();
        let err = tracker
            .acquire(0, "ls", Markers::from_micros(2))
            .unwrap_err();
        assert!(matches!(err, TerminalError::CommandAlreadyRunning(0)));

        // Other sessions are independent.
        let _other = tracker.acquire(1, "ls", Markers::from_micros(3)).unwrap();
        assert_eq!(tracker.all().len(), 2);
    }

    #[test]
    fn test_slot_released_on_drop() {
        let tracker = tracker();
        let slot = tracker.acquire(0, "ls", Markers::from_micros(1)).unwrap();
        assert!(tracker.is_running(0));
        drop(slot);
        assert!(!tracker.is_running(0));
        assert!(tracker.acquire(0, "ls", Markers::from_micros(2)).is_ok());
    }

    #[test]
    fn test_stale_guard_keeps_new_entry() {
        let tracker = tracker();
        let stale = tracker.acquire(0, "old", Markers::from_micros(1)).unwrap();
        assert!(tracker.clear(0));
        let _fresh = tracker.acquire(0, "new", Markers::from_micros(2)).unwrap();

        drop(stale);
        assert_eq!(tracker.get_active(0).unwrap().command, "new");
    }

    #[test]
    fn test_abort_sets_flag() {
        let tracker = tracker();
        let slot = tracker.acquire(2, "sleep 60", Markers::from_micros(1)).unwrap();
        assert!(!slot.is_cancelled());
        assert!(tracker.abort(2));
        assert!(slot.is_cancelled());
        assert!(tracker.get_active(2).unwrap().abort_requested);
        assert!(!tracker.abort(5));
    }

    #[test]
    fn test_abort_all() {
        let tracker = tracker();
        assert!(tracker.abort_all().is_empty());
        let a = tracker.acquire(3, "a", Markers::from_micros(1)).unwrap();
        let b = tracker.acquire(1, "b", Markers::from_micros(2)).unwrap();
        assert_eq!(tracker.abort_all(), vec![1, 3]);
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[test]
    fn test_phase_published() {
        let tracker = tracker();
        let mut rx = tracker.subscribe();
        let slot = tracker.acquire(0, "ls", Markers::from_micros(1)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update()[0].phase, CommandPhase::Idle);

        slot.set_phase(CommandPhase::AwaitingEnd);
        assert_eq!(rx.borrow_and_update()[0].phase, CommandPhase::AwaitingEnd);

        drop(slot);
        assert!(rx.borrow_and_update().is_empty());
    }

    #[test]
    fn test_phase_ignores_other_execution() {
        let tracker = tracker();
        let _slot = tracker.acquire(0, "ls", Markers::from_micros(1)).unwrap();
        tracker.set_phase(0, "__EXEC_S_999__", CommandPhase::Failed);
        assert_eq!(tracker.get_active(0).unwrap().phase, CommandPhase::Idle);
    }
}
