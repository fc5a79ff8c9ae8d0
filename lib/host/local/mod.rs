//! Local PTY host.
//!
//! Spawns shells in pseudo-terminals and arranges them as a tab tree: each top-level entry is
//! either a single terminal or a split group of terminals, mirroring what a desktop terminal
//! emulator shows.

mod pty;
mod reader;
mod tab;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::LocalHostConfig;
use crate::types::{Dimensions, Result, TerminalError};

use super::{TabNode, TerminalHost, TerminalTab};

pub use pty::{child_environment, PtyProcess, SpawnSpec};
pub use tab::{new_tab_key, LocalFrontend, LocalTab};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options for opening a terminal.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Program to run (default: the configured shell).
    pub program: Option<String>,

    /// Program arguments.
    pub args: Vec<String>,

    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Additional environment variables.
    pub env: HashMap<String, String>,

    /// Terminal rows.
    pub rows: Option<u16>,

    /// Terminal columns.
    pub cols: Option<u16>,

    /// Tab title (default: program name).
    pub title: Option<String>,

    /// Key of an open tab to split; the new terminal joins its split group.
    pub split: Option<String>,
}

/// Summary of a freshly opened terminal.
#[derive(Debug, Clone)]
pub struct OpenedTab {
    /// Stable tab key.
    pub key: String,

    /// Tab title.
    pub title: String,

    /// Program started in the tab.
    pub program: String,

    /// Child process id.
    pub pid: Option<u32>,
}

/// Host of local terminals.
pub struct LocalHost {
    config: LocalHostConfig,
    layout: RwLock<Vec<Group>>,
}

/// One top-level entry of the tab bar.
#[derive(Debug, Clone)]
enum Group {
    Single(Arc<LocalTab>),
    Split(Vec<Arc<LocalTab>>),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalHost {
    /// Create an empty host.
    pub fn new(config: LocalHostConfig) -> Self {
        Self {
            config,
            layout: RwLock::new(Vec::new()),
        }
    }

    /// Open a terminal and give it focus.
    pub fn open(&self, opts: OpenOptions) -> Result<OpenedTab> {
        self.prune_exited();
        if self.count() >= self.config.max_sessions {
            return Err(TerminalError::MaxSessionsReached(self.config.max_sessions));
        }

        if let Some(anchor) = &opts.split {
            if self.get(anchor).is_none() {
                return Err(TerminalError::SessionNotFound(anchor.clone()));
            }
        }

        let program = opts
            .program
            .unwrap_or_else(|| self.config.default_shell.clone());
        let title = opts.title.unwrap_or_else(|| program_name(&program));
        let spec = SpawnSpec {
            program: program.clone(),
            args: opts.args,
            cwd: opts.cwd,
            env: opts.env,
            size: Dimensions {
                rows: opts.rows.unwrap_or(self.config.default_rows),
                cols: opts.cols.unwrap_or(self.config.default_cols),
            },
            term: self.config.term.clone(),
        };
        let tab = Arc::new(LocalTab::spawn(
            &spec,
            title.clone(),
            self.config.transcript_limit,
        )?);

        let mut layout = self.write_layout();
        match opts.split {
            Some(anchor) => {
                // The anchor may have closed while the process was spawning.
                match layout.iter().position(|g| g.contains(&anchor)) {
                    Some(idx) => {
                        let mut children = match layout.remove(idx) {
                            Group::Single(existing) => vec![existing],
                            Group::Split(children) => children,
                        };
                        children.push(tab.clone());
                        layout.insert(idx, Group::Split(children));
                    }
                    None => layout.push(Group::Single(tab.clone())),
                }
            }
            None => layout.push(Group::Single(tab.clone())),
        }
        focus_only(&layout, tab.key());
        drop(layout);

        tracing::info!(tab = %tab.key(), %title, "terminal opened");

        Ok(OpenedTab {
            key: tab.key().to_string(),
            title,
            program,
            pid: tab.pid(),
        })
    }

    /// Close a terminal, terminating its process. Blocks until the process exits.
    pub fn close(&self, key: &str, force: bool) -> Result<Option<i32>> {
        let tab = {
            let mut layout = self.write_layout();
            let tab = remove_tab(&mut layout, key)
                .ok_or_else(|| TerminalError::SessionNotFound(key.to_string()))?;
            if tab.has_focus() {
                if let Some(next) = layout.iter().flat_map(Group::tabs).next() {
                    next.set_focus(true);
                }
            }
            tab
        };

        let code = tab.terminate(force)?;
        tracing::info!(tab = %key, exit_code = ?code, "terminal closed");
        Ok(code)
    }

    /// Move focus to the given tab.
    pub fn focus(&self, key: &str) -> Result<()> {
        let layout = self.read_layout();
        if !layout.iter().any(|g| g.contains(key)) {
            return Err(TerminalError::SessionNotFound(key.to_string()));
        }
        focus_only(&layout, key);
        Ok(())
    }

    /// Key of the local tab behind a tab handle.
    pub fn key_of(&self, tab: &Arc<dyn TerminalTab>) -> Option<String> {
        let target = Arc::as_ptr(tab) as *const ();
        self.read_layout()
            .iter()
            .flat_map(Group::tabs)
            .find(|t| Arc::as_ptr(t) as *const () == target)
            .map(|t| t.key().to_string())
    }

    /// Look up a tab by key.
    pub fn get(&self, key: &str) -> Option<Arc<LocalTab>> {
        self.read_layout()
            .iter()
            .flat_map(Group::tabs)
            .find(|t| t.key() == key)
            .cloned()
    }

    /// Number of open terminals.
    pub fn count(&self) -> usize {
        self.read_layout().iter().map(|g| g.tabs().len()).sum()
    }

    /// Drop terminals whose shell has exited. Returns their keys.
    pub fn prune_exited(&self) -> Vec<String> {
        let mut layout = self.write_layout();
        let exited: Vec<String> = layout
            .iter()
            .flat_map(Group::tabs)
            .filter(|t| t.is_closed())
            .map(|t| t.key().to_string())
            .collect();
        for key in &exited {
            remove_tab(&mut layout, key);
            tracing::debug!(tab = %key, "pruned exited terminal");
        }
        exited
    }

    /// Terminate every terminal.
    pub fn shutdown(&self) {
        let groups: Vec<Group> = self.write_layout().drain(..).collect();
        for tab in groups.iter().flat_map(Group::tabs) {
            tracing::info!(tab = %tab.key(), "terminating terminal on shutdown");
            if let Err(e) = tab.terminate(false) {
                tracing::warn!(tab = %tab.key(), error = %e, "failed to terminate terminal");
            }
        }
    }

    /// Host configuration.
    pub fn config(&self) -> &LocalHostConfig {
        &self.config
    }

    fn read_layout(&self) -> RwLockReadGuard<'_, Vec<Group>> {
        self.layout.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_layout(&self) -> RwLockWriteGuard<'_, Vec<Group>> {
        self.layout.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Group {
    fn tabs(&self) -> &[Arc<LocalTab>] {
        match self {
            Self::Single(tab) => std::slice::from_ref(tab),
            Self::Split(children) => children,
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.tabs().iter().any(|t| t.key() == key)
    }

    fn node(&self) -> TabNode {
        match self {
            Self::Single(tab) => TabNode::Terminal(tab.clone()),
            Self::Split(children) => TabNode::Split(
                children
                    .iter()
                    .map(|t| TabNode::Terminal(t.clone() as Arc<dyn TerminalTab>))
                    .collect(),
            ),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl TerminalHost for LocalHost {
    fn tabs(&self) -> Vec<TabNode> {
        self.read_layout().iter().map(Group::node).collect()
    }
}

impl std::fmt::Debug for LocalHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalHost")
            .field("terminals", &self.count())
            .field("max_sessions", &self.config.max_sessions)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn focus_only(layout: &[Group], key: &str) {
    for tab in layout.iter().flat_map(Group::tabs) {
        tab.set_focus(tab.key() == key);
    }
}

/// Remove a tab from the layout, collapsing split groups left with a single child.
fn remove_tab(layout: &mut Vec<Group>, key: &str) -> Option<Arc<LocalTab>> {
    let idx = layout.iter().position(|g| g.contains(key))?;
    match layout.remove(idx) {
        Group::Single(tab) => Some(tab),
        Group::Split(mut children) => {
            let pos = children.iter().position(|t| t.key() == key)?;
            let tab = children.remove(pos);
            match children.len() {
                0 => {}
                1 => layout.insert(idx, Group::Single(children.remove(0))),
                _ => layout.insert(idx, Group::Split(children)),
            }
            Some(tab)
        }
    }
}

fn program_name(program: &str) -> String {
    std::path::Path::new(program)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(program)
        .to_string()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> LocalHost {
        LocalHost::new(LocalHostConfig {
            default_shell: "/bin/sh".into(),
            max_sessions: 3,
            ..Default::default()
        })
    }

    #[test]
    fn test_program_name() {
        assert_eq!(program_name("/usr/bin/zsh"), "zsh");
        assert_eq!(program_name("bash"), "bash");
    }

    #[test]
    fn test_open_focus_and_close() {
        let host = host();
        let a = host.open(OpenOptions::default()).unwrap();
        let b = host.open(OpenOptions::default()).unwrap();
        assert_eq!(host.count(), 2);
        assert_eq!(a.title, "sh");

        assert!(!host.get(&a.key).unwrap().has_focus());
        assert!(host.get(&b.key).unwrap().has_focus());

        host.focus(&a.key).unwrap();
        assert!(host.get(&a.key).unwrap().has_focus());
        assert!(!host.get(&b.key).unwrap().has_focus());

        host.close(&a.key, true).unwrap();
        assert_eq!(host.count(), 1);
        // Focus moves to a remaining tab.
        assert!(host.get(&b.key).unwrap().has_focus());
        host.shutdown();
        assert_eq!(host.count(), 0);
    }

    #[test]
    fn test_split_groups() {
        let host = host();
        let a = host.open(OpenOptions::default()).unwrap();
        let b = host
            .open(OpenOptions {
                split: Some(a.key.clone()),
                ..Default::default()
            })
            .unwrap();

        let tabs = host.tabs();
        assert_eq!(tabs.len(), 1);
        assert!(matches!(&tabs[0], TabNode::Split(children) if children.len() == 2));

        host.close(&b.key, true).unwrap();
        assert!(matches!(&host.tabs()[0], TabNode::Terminal(_)));
        host.shutdown();
    }

    #[test]
    fn test_split_unknown_anchor() {
        let host = host();
        let err = host
            .open(OpenOptions {
                split: Some("tab_missing".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
        host.shutdown();
    }

    #[test]
    fn test_max_sessions() {
        let host = host();
        for _ in 0..3 {
            host.open(OpenOptions::default()).unwrap();
        }
        let err = host.open(OpenOptions::default()).unwrap_err();
        assert!(matches!(err, TerminalError::MaxSessionsReached(3)));
        host.shutdown();
    }

    #[test]
    fn test_key_of() {
        let host = host();
        let opened = host.open(OpenOptions::default()).unwrap();
        let handle = match &host.tabs()[0] {
            TabNode::Terminal(tab) => tab.clone(),
            TabNode::Split(_) => unreachable!(),
        };
        assert_eq!(host.key_of(&handle), Some(opened.key));
        host.shutdown();
    }
}
