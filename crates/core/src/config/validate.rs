use chrono_tz::Tz;

use super::{types::Config, ConfigError};
use crate::engine::{check_interval, MAX_EXPIRY_INTERVAL_SECS, MAX_INTERVAL_SECS};

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

fn check_range(name: &str, value: u64, max: u64) -> Result<(), ConfigError> {
    check_interval(name, value, max).map_err(ConfigError::ValidationError)
}

fn check_timezone(name: &str, value: &str) -> Result<(), ConfigError> {
    value
        .parse::<Tz>()
        .map(|_| ())
        .map_err(|_| invalid(format!("{} is not a known timezone: {:?}", name, value)))
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Job intervals within their allowed ranges
/// - Timeouts and fan-out are non-zero
/// - Tracker and schedule timezones resolve
/// - Window bounds parse as `HH:MM`
/// - Capacity thresholds are ordered and bound to a backend when enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let engine = &config.engine;
    check_range(
        "engine.refresh_interval_secs",
        engine.refresh_interval_secs,
        MAX_INTERVAL_SECS,
    )?;
    check_range(
        "engine.acquisition_interval_secs",
        engine.acquisition_interval_secs,
        MAX_INTERVAL_SECS,
    )?;
    check_range(
        "engine.expiry_interval_secs",
        engine.expiry_interval_secs,
        MAX_EXPIRY_INTERVAL_SECS,
    )?;
    check_range(
        "engine.eviction_interval_secs",
        engine.eviction_interval_secs,
        MAX_INTERVAL_SECS,
    )?;
    if engine.status_timeout_secs == 0 || engine.fetch_timeout_secs == 0 {
        return Err(invalid("engine timeouts must be greater than 0"));
    }
    if engine.max_fanout == 0 {
        return Err(invalid("engine.max_fanout must be greater than 0"));
    }
    if engine.search_page_size == 0 {
        return Err(invalid("engine.search_page_size must be greater than 0"));
    }

    if config.tracker.base_url.trim().is_empty() {
        return Err(invalid("tracker.base_url cannot be empty"));
    }
    check_timezone("tracker.timezone", &config.tracker.timezone)?;

    config
        .schedule
        .validate()
        .map_err(|e| invalid(format!("schedule.{}", e)))?;
    config
        .auto_delete
        .validate()
        .map_err(|e| invalid(format!("auto_delete.{}", e)))?;

    Ok(())
}
