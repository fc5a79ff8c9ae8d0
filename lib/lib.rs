//! Terminal Exec MCP Server
//!
//! An MCP server that lets AI agents run shell commands inside interactive terminal sessions and
//! get back clean output, the exit code and the prompt that followed.
//!
//! # Features
//!
//! - **Marker Framing**: Commands are wrapped in unique start/end markers so their output can be
//!   cut out of a noisy terminal buffer
//! - **Shell Detection**: bash, zsh and POSIX sh are recognised and get shell-specific setup
//! - **Abort and Preemption**: One command per session, with cooperative abort and automatic
//!   preemption when a new command arrives
//! - **Output Pagination**: Long output is truncated in the response and kept for paged retrieval
//! - **Local PTY Host**: Terminals are real pseudo-terminals, optionally grouped into splits
//!
//! # Platform Support
//!
//! Unix only (macOS, Linux).

#![cfg(unix)]

pub mod config;
pub mod exec;
pub mod host;
pub mod server;
pub mod session;
pub mod shell;
pub mod terminal;
pub mod tools;
pub mod types;

pub use config::{ExecConfig, GlobalConfig, LocalHostConfig};
pub use exec::{ExecEngine, ExecOutcome, ExecRequest};
pub use host::{LocalHost, TabNode, TerminalFrontend, TerminalHost, TerminalTab};
pub use server::Server;
pub use session::{Session, SessionRegistry};
pub use types::{Dimensions, OutputFormat, Result, TerminalError};
