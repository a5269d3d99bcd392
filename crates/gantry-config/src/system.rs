//! Coordinator configuration parsing.

use crate::{ConfigError, ConfigResult, parse_duration};
use kdl::{KdlDocument, KdlNode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static COMPONENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("component name regex is valid"));

/// Configuration of one coordinator process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub database: DatabaseConfig,
    pub admission: AdmissionConfig,
    /// Periodic maintenance components, each run under its own lock.
    pub components: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string. `DATABASE_URL` takes precedence when set.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Cluster capacity limits used by admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Estimated container capacity of a single worker.
    pub per_worker_containers: u32,
    /// Fraction of total capacity that may be used before the cluster counts as saturated.
    pub safety_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    pub interval: Duration,
    /// Initial paused flag, applied only when the component is first created.
    pub paused: bool,
    pub batch_size: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            per_worker_containers: 250,
            safety_fraction: 0.9,
        }
    }
}

impl ComponentConfig {
    pub fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            interval,
            paused: false,
            batch_size: None,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            admission: AdmissionConfig::default(),
            components: default_components(),
        }
    }
}

impl CoordinatorConfig {
    pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }
}

fn default_components() -> Vec<ComponentConfig> {
    vec![
        ComponentConfig::new("scheduler", Duration::from_secs(10)),
        ComponentConfig {
            batch_size: Some(500),
            ..ComponentConfig::new("build-reaper", Duration::from_secs(30))
        },
        ComponentConfig::new("collector", Duration::from_secs(30)),
    ]
}

/// Read and parse a coordinator configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<CoordinatorConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_coordinator_config(&text)
}

/// Parse coordinator configuration from KDL text.
///
/// When no `component` nodes are present the default set is used.
pub fn parse_coordinator_config(kdl: &str) -> ConfigResult<CoordinatorConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut database = DatabaseConfig::default();
    let mut admission = AdmissionConfig::default();
    let mut components = Vec::new();
    let mut seen = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "database" => {
                if let Some(url) = get_string_prop(node, "url") {
                    database.url = Some(url);
                }
                if let Some(max) = get_u32_prop(node, "max-connections")? {
                    if max == 0 {
                        return Err(invalid("database max-connections", "must be at least 1"));
                    }
                    database.max_connections = max;
                }
            }
            "admission" => {
                if let Some(per_worker) = get_u32_prop(node, "per-worker-containers")? {
                    admission.per_worker_containers = per_worker;
                }
                if let Some(fraction) = get_f64_prop(node, "safety-fraction") {
                    if !(fraction > 0.0 && fraction <= 1.0) {
                        return Err(invalid(
                            "admission safety-fraction",
                            &format!("{} is outside (0, 1]", fraction),
                        ));
                    }
                    admission.safety_fraction = fraction;
                }
            }
            "component" => {
                let component = parse_component(node)?;
                if !seen.insert(component.name.clone()) {
                    return Err(ConfigError::Duplicate(format!(
                        "component '{}'",
                        component.name
                    )));
                }
                components.push(component);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if components.is_empty() {
        components = default_components();
    }

    Ok(CoordinatorConfig {
        database,
        admission,
        components,
    })
}

fn parse_component(node: &KdlNode) -> ConfigResult<ComponentConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("component name".to_string()))?;

    if !COMPONENT_NAME_RE.is_match(&name) {
        return Err(invalid(
            "component name",
            &format!("'{}' must match {}", name, COMPONENT_NAME_RE.as_str()),
        ));
    }

    let interval_text = get_string_prop(node, "interval").ok_or_else(|| {
        ConfigError::MissingField(format!("interval for component '{}'", name))
    })?;
    let interval = parse_duration("component interval", &interval_text)?;
    if interval.is_zero() {
        return Err(invalid(
            "component interval",
            &format!("component '{}' has a zero interval", name),
        ));
    }

    Ok(ComponentConfig {
        paused: get_bool_prop(node, "paused").unwrap_or(false),
        batch_size: get_u32_prop(node, "batch-size")?,
        name,
        interval,
    })
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

fn get_u32_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<u32>> {
    match node.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|i| u32::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| invalid(name, &format!("{} is not a non-negative integer", value))),
    }
}

fn get_f64_prop(node: &KdlNode, name: &str) -> Option<f64> {
    node.get(name)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
}
