//! Duration literals used in configuration files.

use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*(ms|s|m|h)\s*$").expect("duration regex is valid")
});

/// Parse a duration such as `500ms`, `30s`, `5m` or `1h`.
pub fn parse_duration(field: &str, text: &str) -> ConfigResult<Duration> {
    let invalid = |message: String| ConfigError::InvalidValue {
        field: field.to_string(),
        message,
    };

    let caps = DURATION_RE
        .captures(text)
        .ok_or_else(|| invalid(format!("'{}' is not a duration (expected e.g. 30s)", text)))?;

    let amount: u64 = caps[1]
        .parse()
        .map_err(|e| invalid(format!("'{}': {}", text, e)))?;

    let duration = match &caps[2] {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(3600)),
        _ => unreachable!("regex only matches known units"),
    };

    Ok(duration)
}
