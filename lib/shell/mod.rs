//! Shell families: detection and the hook scripts used to frame command output.

mod detect;
mod strategy;

pub use detect::{count_reports, detect_type, detection_script, REPORT_PREFIX};
pub use strategy::{ShellKind, ShellRegistry};
