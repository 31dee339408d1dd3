//! Session management

pub mod controller;
pub mod registry;

pub use controller::{ReservedIds, SessionController, apply_labels};
pub use registry::{Session, SessionRegistry, SessionState};
