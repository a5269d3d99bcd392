//! KDL configuration parsing for the Gantry coordinator.
//!
//! This crate handles parsing of:
//! - Coordinator configuration (gantry.kdl)
//! - Duration literals such as `30s` or `5m`

pub mod duration;
pub mod error;
pub mod system;

pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
pub use system::{
    AdmissionConfig, ComponentConfig, CoordinatorConfig, DatabaseConfig, load_config,
    parse_coordinator_config,
};
