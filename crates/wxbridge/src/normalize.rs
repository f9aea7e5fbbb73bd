//! Turn raw hub condition records into normalized readings.
//!
//! Every field of a condition is classified into a family (temperature,
//! humidity, wind, rain, ...) that decides its conversion, display
//! precision and unit suffix. Unrecognized fields pass through untouched
//! so new firmware keys are never lost.

use serde_json::Value;
use wxlive::RawCondition;

use crate::units::{RainCollector, UnitPreferences};

/// Errors from normalizing a condition record.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unknown rain collector code: {0}")]
    UnknownRainCollector(u8),
}

/// A cached or delivered sensor value.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Number(f64),
    Text(String),
}

impl StateValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            StateValue::Text(_) => None,
        }
    }
}

/// One normalized field of a condition record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingEntry {
    /// Canonical key, after aliasing.
    pub key: String,
    pub value: StateValue,
    /// Display precision; `None` for passthrough and text values.
    pub decimal_places: Option<u8>,
    /// Human-facing rendering with unit suffix, where the family has one.
    pub display: Option<String>,
}

/// A full condition record after normalization, one entry per field.
pub type NormalizedReading = Vec<ReadingEntry>;

// Older hub firmware spells the short-window rain accumulations with a
// `rainfall_last_` prefix; canonical keys drop it.
fn alias(key: &str) -> &str {
    match key {
        "rainfall_last_15_min" => "rain_15_min",
        "rainfall_last_60_min" => "rain_60_min",
        "rainfall_last_24_hr" => "rain_24_hr",
        other => other,
    }
}

const TEMPERATURE_KEYS: &[&str] = &[
    "temp",
    "temp_in",
    "temp_1",
    "temp_2",
    "temp_3",
    "temp_4",
    "dew_point",
    "dew_point_in",
    "wet_bulb",
    "heat_index",
    "heat_index_in",
    "wind_chill",
    "thw_index",
    "thsw_index",
];

const HUMIDITY_KEYS: &[&str] = &["hum", "hum_in"];

const BAROMETRIC_KEYS: &[&str] = &["bar_sea_level", "bar_absolute", "bar_trend"];

const WIND_SPEED_KEYS: &[&str] = &[
    "wind_speed_last",
    "wind_speed_avg_last_1_min",
    "wind_speed_avg_last_2_min",
    "wind_speed_hi_last_2_min",
    "wind_speed_avg_last_10_min",
    "wind_speed_hi_last_10_min",
];

const WIND_DIR_KEYS: &[&str] = &[
    "wind_dir_last",
    "wind_dir_scalar_avg_last_1_min",
    "wind_dir_scalar_avg_last_2_min",
    "wind_dir_at_hi_speed_last_2_min",
    "wind_dir_scalar_avg_last_10_min",
    "wind_dir_at_hi_speed_last_10_min",
];

const TIMESTAMP_KEYS: &[&str] = &[
    "rain_storm_start_at",
    "rain_storm_last_start_at",
    "rain_storm_last_end_at",
    "timestamp",
];

const RAIN_RATE_KEYS: &[&str] = &["rain_rate_last", "rain_rate_hi", "rain_rate_hi_last_15_min"];

const RAIN_AMOUNT_KEYS: &[&str] = &[
    "rain_15_min",
    "rain_60_min",
    "rain_24_hr",
    "rain_storm",
    "rain_storm_last",
    "rainfall_daily",
    "rainfall_monthly",
    "rainfall_year",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Temperature,
    Humidity,
    Barometric,
    WindSpeed,
    WindDirection,
    Timestamp,
    RainRate,
    RainAmount,
    Passthrough,
}

fn family_of(key: &str) -> Family {
    if TEMPERATURE_KEYS.contains(&key) {
        Family::Temperature
    } else if HUMIDITY_KEYS.contains(&key) {
        Family::Humidity
    } else if BAROMETRIC_KEYS.contains(&key) {
        Family::Barometric
    } else if WIND_SPEED_KEYS.contains(&key) {
        Family::WindSpeed
    } else if WIND_DIR_KEYS.contains(&key) {
        Family::WindDirection
    } else if TIMESTAMP_KEYS.contains(&key) {
        Family::Timestamp
    } else if RAIN_RATE_KEYS.contains(&key) {
        Family::RainRate
    } else if RAIN_AMOUNT_KEYS.contains(&key) {
        Family::RainAmount
    } else {
        Family::Passthrough
    }
}

/// Normalize one condition record.
///
/// The collector defaults to the configured hardware but a `rain_size`
/// field in the record itself wins when present. Null fields become
/// empty text; non-numeric values on numeric fields coerce to zero.
pub fn normalize(
    raw: &RawCondition,
    default_collector: RainCollector,
    units: &UnitPreferences,
) -> Result<NormalizedReading, NormalizeError> {
    let collector = match raw.number("rain_size") {
        Some(code) => {
            let code = code as u8;
            RainCollector::from_code(code).ok_or(NormalizeError::UnknownRainCollector(code))?
        }
        None => default_collector,
    };

    let mut entries = Vec::with_capacity(raw.fields.len());
    for (field, value) in &raw.fields {
        let key = alias(field);

        if value.is_null() {
            entries.push(ReadingEntry {
                key: key.to_string(),
                value: StateValue::Text(String::new()),
                decimal_places: None,
                display: None,
            });
            continue;
        }

        let family = family_of(key);
        if family == Family::Passthrough {
            entries.push(passthrough_entry(key, value));
            continue;
        }

        let number = match value.as_f64() {
            Some(n) => n,
            None => {
                log::warn!(
                    "sensor {}: non-numeric value for {}: {}, coercing to 0",
                    raw.lsid,
                    field,
                    value
                );
                0.0
            }
        };

        entries.push(family_entry(key, family, number, collector, units));
    }

    Ok(entries)
}

fn passthrough_entry(key: &str, value: &Value) -> ReadingEntry {
    let state = match value.as_f64() {
        Some(n) => StateValue::Number(n),
        None => match value.as_str() {
            Some(s) => StateValue::Text(s.to_string()),
            None => StateValue::Text(value.to_string()),
        },
    };
    ReadingEntry {
        key: key.to_string(),
        value: state,
        decimal_places: None,
        display: None,
    }
}

fn family_entry(
    key: &str,
    family: Family,
    number: f64,
    collector: RainCollector,
    units: &UnitPreferences,
) -> ReadingEntry {
    let (value, decimal_places, display) = match family {
        Family::Temperature => {
            let v = units.temperature.convert(number);
            let display = format!("{:.1} °{}", v, units.temperature.label());
            (StateValue::Number(v), Some(1), Some(display))
        }
        Family::Humidity => (
            StateValue::Number(number),
            Some(0),
            Some(format!("{:.0}%", number)),
        ),
        Family::Barometric => {
            let v = units.pressure.convert(number);
            let display = format!("{:.2} {}", v, units.pressure.label());
            (StateValue::Number(v), Some(2), Some(display))
        }
        Family::WindSpeed => {
            let v = units.wind.convert(number);
            let display = format!("{:.0} {}", v, units.wind.label());
            (StateValue::Number(v), Some(0), Some(display))
        }
        Family::WindDirection => (
            StateValue::Number(number),
            Some(0),
            Some(format!("{:.0}°", number)),
        ),
        Family::Timestamp => (StateValue::Text(local_time_string(number)), None, None),
        Family::RainRate => {
            let v = number * collector.tip_size();
            let label = collector.unit_label();
            let display = if label.is_empty() {
                format!("{:.2}", v)
            } else {
                format!("{:.2} {}/hr", v, label)
            };
            (StateValue::Number(v), Some(2), Some(display))
        }
        Family::RainAmount => {
            let v = number * collector.tip_size();
            let label = collector.unit_label();
            let display = if label.is_empty() {
                format!("{:.2}", v)
            } else {
                format!("{:.2} {}", v, label)
            };
            (StateValue::Number(v), Some(2), Some(display))
        }
        Family::Passthrough => unreachable!("passthrough handled by caller"),
    };

    ReadingEntry {
        key: key.to_string(),
        value,
        decimal_places,
        display,
    }
}

/// Render hub epoch seconds as a local wall-clock string.
fn local_time_string(epoch: f64) -> String {
    match chrono::DateTime::from_timestamp(epoch as i64, 0) {
        Some(utc) => utc
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => epoch.to_string(),
    }
}
