//! Terminal session discovery.

mod registry;

pub use registry::{Session, SessionRegistry};
