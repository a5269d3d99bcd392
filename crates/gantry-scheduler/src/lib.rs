//! Lock-coordinated scheduling for the Gantry coordinator.
//!
//! Every coordinator in the fleet runs the same loops against one shared
//! database. Advisory locks make sure each maintenance task runs on one
//! coordinator at a time, that schema migrations run once, and admission
//! control decides which pending build of a job may start next.

pub mod admission;
pub mod collector;
pub mod coordinator;
pub mod lock_runner;
pub mod migration;
pub mod reaper;
pub mod starter;

#[cfg(test)]
mod fakes;

pub use admission::{AdmissionController, AdmissionError, CapacityLimits};
pub use collector::WorkerCollector;
pub use coordinator::Coordinator;
pub use lock_runner::LockRunner;
pub use migration::MigrationGate;
pub use reaper::BuildReaper;
pub use starter::{BuildStarter, SchedulingTask};
