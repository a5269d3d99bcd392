//! Coordinator process for Gantry CI.
//!
//! Wires the PostgreSQL collaborators into the lock runners and runs them
//! behind the migration gate.

pub mod startup;

pub use startup::{Startup, build_runners};
