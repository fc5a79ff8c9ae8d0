//! Discovery of terminal sessions in the host's tab tree.

use std::sync::Arc;

use crate::host::{TabNode, TerminalHost, TerminalTab};
use crate::types::{Result, TerminalError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A terminal discovered in the host.
///
/// The `id` comes from discovery order and is only meaningful against the list it came from.
#[derive(Clone)]
pub struct Session {
    /// Position in discovery order.
    pub id: usize,

    /// Tab title.
    pub title: String,

    /// Whether the tab has input focus.
    pub has_focus: bool,

    /// Handle used to send input and read the buffer.
    pub tab: Arc<dyn TerminalTab>,
}

/// Enumerates sessions and reads their buffers.
#[derive(Clone)]
pub struct SessionRegistry {
    host: Arc<dyn TerminalHost>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SessionRegistry {
    /// Create a registry over a host.
    pub fn new(host: Arc<dyn TerminalHost>) -> Self {
        Self { host }
    }

    /// Flatten the tab tree into sessions.
    ///
    /// Top-level terminals are always listed. Terminals inside split groups are listed only when
    /// they have a frontend.
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut sessions = Vec::new();
        for node in self.host.tabs() {
            match node {
                TabNode::Terminal(tab) => push_session(&mut sessions, tab),
                TabNode::Split(children) => collect_split(&mut sessions, children),
            }
        }
        sessions
    }

    /// The focused session, if any.
    pub fn find_focused<'a>(&self, sessions: &'a [Session]) -> Option<&'a Session> {
        sessions.iter().find(|s| s.has_focus)
    }

    /// Pick the session a tool call targets.
    ///
    /// An explicit id must name a listed session. Without one, the focused session is used,
    /// then the first.
    pub fn resolve(&self, sessions: &[Session], tab_id: Option<&str>) -> Result<Session> {
        match tab_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .and_then(|id| sessions.iter().find(|s| s.id == id))
                .cloned()
                .ok_or_else(|| TerminalError::SessionNotFound(raw.to_string())),
            None => self
                .find_focused(sessions)
                .or_else(|| sessions.first())
                .cloned()
                .ok_or(TerminalError::NoSessions),
        }
    }

    /// Serialize a session's full buffer.
    ///
    /// The serializer is attached on first use and reused afterwards.
    pub fn buffer_text(&self, session: &Session) -> Result<String> {
        let frontend = session
            .tab
            .frontend()
            .ok_or(TerminalError::FrontendUnavailable(session.id))?;
        if !frontend.has_serializer() {
            tracing::debug!(session_id = session.id, "attaching buffer serializer");
            frontend.attach_serializer()?;
        }
        frontend.serialize()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("has_focus", &self.has_focus)
            .finish()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn push_session(sessions: &mut Vec<Session>, tab: Arc<dyn TerminalTab>) {
    sessions.push(Session {
        id: sessions.len(),
        title: tab.title(),
        has_focus: tab.has_focus(),
        tab,
    });
}

fn collect_split(sessions: &mut Vec<Session>, children: Vec<TabNode>) {
    for child in children {
        match child {
            TabNode::Terminal(tab) if tab.frontend().is_some() => push_session(sessions, tab),
            TabNode::Terminal(_) => {}
            TabNode::Split(nested) => collect_split(sessions, nested),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::host::TerminalFrontend;

    struct StubFrontend {
        attached: Mutex<bool>,
        attach_calls: AtomicUsize,
    }

    struct StubTab {
        title: &'static str,
        focus: bool,
        frontend: Option<Arc<StubFrontend>>,
    }

    struct StubHost(Vec<TabNode>);

    impl TerminalFrontend for StubFrontend {
        fn has_serializer(&self) -> bool {
            *self.attached.lock().unwrap()
        }

        fn attach_serializer(&self) -> Result<()> {
            self.attach_calls.fetch_add(1, Ordering::SeqCst);
            *self.attached.lock().unwrap() = true;
            Ok(())
        }

        fn serialize(&self) -> Result<String> {
            Ok("$ ".into())
        }
    }

    impl TerminalTab for StubTab {
        fn title(&self) -> String {
            self.title.into()
        }

        fn has_focus(&self) -> bool {
            self.focus
        }

        fn send_input(&self, _data: &str) -> Result<()> {
            Ok(())
        }

        fn frontend(&self) -> Option<Arc<dyn TerminalFrontend>> {
            self.frontend
                .clone()
                .map(|f| f as Arc<dyn TerminalFrontend>)
        }
    }

    impl TerminalHost for StubHost {
        fn tabs(&self) -> Vec<TabNode> {
            self.0.clone()
        }
    }

    fn frontend() -> Arc<StubFrontend> {
        Arc::new(StubFrontend {
            attached: Mutex::new(false),
            attach_calls: AtomicUsize::new(0),
        })
    }

    fn tab(title: &'static str, focus: bool, rendered: bool) -> TabNode {
        TabNode::Terminal(Arc::new(StubTab {
            title,
            focus,
            frontend: rendered.then(frontend),
        }))
    }

    fn registry(nodes: Vec<TabNode>) -> SessionRegistry {
        SessionRegistry::new(Arc::new(StubHost(nodes)))
    }

    #[test]
    fn test_flatten_splits() {
        let reg = registry(vec![
            tab("top", false, false),
            TabNode::Split(vec![
                tab("left", false, true),
                tab("hidden", false, false),
                TabNode::Split(vec![tab("nested", true, true)]),
            ]),
        ]);
        let sessions = reg.list_sessions();
        let titles: Vec<_> = sessions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["top", "left", "nested"]);
        assert_eq!(
            sessions.iter().map(|s| s.id).collect::<Vec<_>>(),
            [0, 1, 2]
        );
    }

    #[test]
    fn test_resolve_prefers_focus_then_first() {
        let reg = registry(vec![tab("a", false, true), tab("b", true, true)]);
        let sessions = reg.list_sessions();
        assert_eq!(reg.resolve(&sessions, None).unwrap().title, "b");

        let reg = registry(vec![tab("a", false, true), tab("b", false, true)]);
        let sessions = reg.list_sessions();
        assert_eq!(reg.resolve(&sessions, None).unwrap().title, "a");
        assert_eq!(reg.resolve(&sessions, Some(" ")).unwrap().title, "a");
    }

    #[test]
    fn test_resolve_explicit_id() {
        let reg = registry(vec![tab("a", true, true), tab("b", false, true)]);
        let sessions = reg.list_sessions();
        assert_eq!(reg.resolve(&sessions, Some("1")).unwrap().title, "b");

        let err = reg.resolve(&sessions, Some("7")).unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
        let err = reg.resolve(&sessions, Some("abc")).unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_resolve_empty() {
        let reg = registry(vec![]);
        let err = reg.resolve(&reg.list_sessions(), None).unwrap_err();
        assert_eq!(err.code(), "NO_SESSIONS");
    }

    #[test]
    fn test_serializer_attached_once() {
        let stub = frontend();
        let reg = registry(vec![TabNode::Terminal(Arc::new(StubTab {
            title: "a",
            focus: true,
            frontend: Some(stub.clone()),
        }))]);
        let sessions = reg.list_sessions();

        assert_eq!(reg.buffer_text(&sessions[0]).unwrap(), "$ ");
        assert_eq!(reg.buffer_text(&sessions[0]).unwrap(), "$ ");
        assert_eq!(stub.attach_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_buffer_without_frontend() {
        let reg = registry(vec![tab("a", true, false)]);
        let sessions = reg.list_sessions();
        let err = reg.buffer_text(&sessions[0]).unwrap_err();
        assert!(matches!(err, TerminalError::FrontendUnavailable(0)));
    }
}
