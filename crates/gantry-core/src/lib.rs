//! Core domain types and collaborator traits for the Gantry coordinator.
//!
//! This crate contains:
//! - Lock identifiers and the advisory lock traits
//! - Component (periodic maintenance task) metadata traits
//! - Job, build and worker types consumed by admission control
//! - The `Task` and `Runner` capabilities driven by the scheduler

pub mod build;
pub mod component;
pub mod error;
pub mod job;
pub mod lock;
pub mod runner;
pub mod worker;

pub use build::{Build, BuildLogStore, BuildStatus, RetentionPolicy};
pub use component::{Component, ComponentRegistry};
pub use error::{Error, Result};
pub use job::{Job, JobRepository};
pub use lock::{Lock, LockFactory, LockId};
pub use runner::{Migrator, Runner, Task};
pub use worker::{WorkerInventory, WorkerLifecycle, WorkerRecord, WorkerState};
