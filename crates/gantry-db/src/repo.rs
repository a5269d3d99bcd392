//! Collaborator implementations.

pub mod build_log;
pub mod component;
pub mod job;
pub mod lock;
pub mod migrator;
pub mod worker;

pub use build_log::PgBuildLogStore;
pub use component::{PgComponent, PgComponentRegistry};
pub use job::{JobSettings, PgJob, PgJobRepository};
pub use lock::{PgLock, PgLockFactory};
pub use migrator::PgMigrator;
pub use worker::PgWorkerRepository;
