//! Configuration validation.
//!
//! Validates all config fields before any data is opened.

use crate::domain::calendar::WeekdayCalendar;
use crate::domain::error::PitcalcError;
use crate::domain::point_in_time::DEFAULT_MAX_STALENESS_DAYS;
use crate::domain::registry::parse_equation_names;
use crate::ports::config_port::ConfigPort;

const MAX_POOL_SIZE: i64 = 64;
const MAX_STALENESS_LIMIT: i64 = 366;

pub fn validate_store_config(config: &dyn ConfigPort) -> Result<(), PitcalcError> {
    validate_store_location(config)?;
    validate_pool_size(config)?;
    max_staleness_days(config)?;
    Ok(())
}

pub fn validate_calendar_config(config: &dyn ConfigPort) -> Result<(), PitcalcError> {
    WeekdayCalendar::from_config(config).map(|_| ())
}

pub fn validate_calculate_config(config: &dyn ConfigPort) -> Result<(), PitcalcError> {
    if let Some(raw) = config.get_string("calculate", "as_of") {
        if config.get_date("calculate", "as_of").is_none() {
            return Err(PitcalcError::ConfigInvalid {
                section: "calculate".to_string(),
                key: "as_of".to_string(),
                reason: format!("'{}' is not a YYYY-MM-DD date", raw.trim()),
            });
        }
    }

    if let Some(raw) = config.get_string("calculate", "equations") {
        parse_equation_names(&raw).map_err(|e| PitcalcError::ConfigInvalid {
            section: "calculate".to_string(),
            key: "equations".to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// `[store] max_staleness_days`, defaulting to a week.
pub fn max_staleness_days(config: &dyn ConfigPort) -> Result<u32, PitcalcError> {
    let value = config.get_int(
        "store",
        "max_staleness_days",
        DEFAULT_MAX_STALENESS_DAYS as i64,
    );
    if !(0..=MAX_STALENESS_LIMIT).contains(&value) {
        return Err(PitcalcError::ConfigInvalid {
            section: "store".to_string(),
            key: "max_staleness_days".to_string(),
            reason: format!("max_staleness_days must be between 0 and {}", MAX_STALENESS_LIMIT),
        });
    }
    Ok(value as u32)
}

fn validate_store_location(config: &dyn ConfigPort) -> Result<(), PitcalcError> {
    let sqlite = non_empty(config.get_string("sqlite", "path"));
    let csv = non_empty(config.get_string("csv", "dir"));
    match (sqlite, csv) {
        (None, None) => Err(PitcalcError::ConfigMissing {
            section: "sqlite".to_string(),
            key: "path".to_string(),
        }),
        (Some(_), Some(_)) => Err(PitcalcError::ConfigInvalid {
            section: "csv".to_string(),
            key: "dir".to_string(),
            reason: "configure either [sqlite] path or [csv] dir, not both".to_string(),
        }),
        _ => Ok(()),
    }
}

fn validate_pool_size(config: &dyn ConfigPort) -> Result<(), PitcalcError> {
    let size = config.get_int("sqlite", "pool_size", 4);
    if !(1..=MAX_POOL_SIZE).contains(&size) {
        return Err(PitcalcError::ConfigInvalid {
            section: "sqlite".to_string(),
            key: "pool_size".to_string(),
            reason: format!("pool_size must be between 1 and {}", MAX_POOL_SIZE),
        });
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
