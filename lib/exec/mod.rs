//! Command execution over host terminals.

mod active;
mod engine;
mod frame;
mod store;

pub use active::{ActiveCommand, ActiveCommandTracker, ActiveSlot, ActiveSnapshot, CommandPhase};
pub use engine::{dispatch_text, ExecEngine, ExecOutcome, ExecRequest};
pub use frame::{
    extract_partial, parse_exit_code, scan, Frame, FrameScan, MarkerClock, Markers,
};
pub use store::{OutputMetadata, OutputPage, OutputStore, StoredOutput};
