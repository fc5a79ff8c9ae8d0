//! Host terminal environment.
//!
//! The execution engine never talks to a PTY directly. It sees the host as a tree of tabs, each
//! of which accepts keyboard input and (when rendered) exposes a frontend that can serialize its
//! buffer to text. [`LocalHost`] is the bundled implementation backed by local pseudo-terminals.

use std::sync::Arc;

use crate::types::Result;

pub mod local;

pub use local::{LocalHost, OpenOptions, OpenedTab};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A node of the host's tab tree.
#[derive(Clone)]
pub enum TabNode {
    /// A terminal tab.
    Terminal(Arc<dyn TerminalTab>),

    /// A split container holding further nodes.
    Split(Vec<TabNode>),
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The host environment: something that can enumerate its open terminal tabs.
pub trait TerminalHost: Send + Sync {
    /// Top-level tabs in display order.
    fn tabs(&self) -> Vec<TabNode>;
}

/// A single terminal tab.
pub trait TerminalTab: Send + Sync {
    /// Title shown for the tab.
    fn title(&self) -> String;

    /// Whether the tab currently holds input focus.
    fn has_focus(&self) -> bool;

    /// Send text to the tab exactly as if typed.
    fn send_input(&self, data: &str) -> Result<()>;

    /// The rendering frontend, if the tab has one.
    fn frontend(&self) -> Option<Arc<dyn TerminalFrontend>>;
}

/// Rendering frontend of a tab.
pub trait TerminalFrontend: Send + Sync {
    /// Whether a buffer serializer is attached.
    fn has_serializer(&self) -> bool;

    /// Attach a buffer serializer. Attaching twice must be harmless.
    fn attach_serializer(&self) -> Result<()>;

    /// Serialize the full buffer, scrollback included, to text.
    fn serialize(&self) -> Result<String>;
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for TabNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal(tab) => f.debug_tuple("Terminal").field(&tab.title()).finish(),
            Self::Split(children) => f.debug_tuple("Split").field(children).finish(),
        }
    }
}
