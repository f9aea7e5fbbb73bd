//! Unit preferences and conversions.
//!
//! The hub always reports imperial units: Fahrenheit, inches of mercury,
//! miles per hour, and rain collector tip counts. Conversions here map
//! raw readings into the operator's preferred units and back; uploads
//! need the inverse direction because the weather services expect
//! imperial regardless of what the operator displays.

use serde::Deserialize;

/// Temperature display preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "f")]
    Fahrenheit,
    #[serde(rename = "c")]
    Celsius,
}

impl TemperatureUnit {
    /// Convert a raw Fahrenheit reading into this unit.
    pub fn convert(self, raw: f64) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => raw,
            TemperatureUnit::Celsius => (raw - 32.0) * 5.0 / 9.0,
        }
    }

    /// Map a value in this unit back to Fahrenheit.
    pub fn to_fahrenheit(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => value,
            TemperatureUnit::Celsius => value * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "F",
            TemperatureUnit::Celsius => "C",
        }
    }
}

/// Barometric pressure display preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum PressureUnit {
    #[default]
    #[serde(rename = "in")]
    InchesHg,
    #[serde(rename = "mm")]
    MillimetersHg,
    #[serde(rename = "mb")]
    Millibars,
    #[serde(rename = "hpa")]
    Hectopascals,
}

impl PressureUnit {
    /// Convert a raw inches-of-mercury reading into this unit.
    pub fn convert(self, raw: f64) -> f64 {
        match self {
            PressureUnit::InchesHg => raw,
            PressureUnit::MillimetersHg => raw * 25.4,
            PressureUnit::Millibars | PressureUnit::Hectopascals => raw * 33.8639,
        }
    }

    /// Map a value in this unit back to inches of mercury.
    pub fn to_inches_hg(self, value: f64) -> f64 {
        match self {
            PressureUnit::InchesHg => value,
            PressureUnit::MillimetersHg => value / 25.4,
            PressureUnit::Millibars | PressureUnit::Hectopascals => value / 33.8639,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PressureUnit::InchesHg => "in",
            PressureUnit::MillimetersHg => "mm",
            PressureUnit::Millibars => "mb",
            PressureUnit::Hectopascals => "hPa",
        }
    }
}

/// Wind speed display preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum WindUnit {
    #[default]
    #[serde(rename = "mph")]
    MilesPerHour,
    #[serde(rename = "knots")]
    Knots,
    #[serde(rename = "kph")]
    KilometersPerHour,
    #[serde(rename = "mps")]
    MetersPerSecond,
}

impl WindUnit {
    /// Convert a raw miles-per-hour reading into this unit.
    pub fn convert(self, raw: f64) -> f64 {
        match self {
            WindUnit::MilesPerHour => raw,
            WindUnit::Knots => raw * 0.868_976,
            WindUnit::KilometersPerHour => raw * 1.609_34,
            WindUnit::MetersPerSecond => raw * 0.447_04,
        }
    }

    /// Map a value in this unit back to miles per hour.
    pub fn to_mph(self, value: f64) -> f64 {
        match self {
            WindUnit::MilesPerHour => value,
            WindUnit::Knots => value / 0.868_976,
            WindUnit::KilometersPerHour => value / 1.609_34,
            WindUnit::MetersPerSecond => value / 0.447_04,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WindUnit::MilesPerHour => "mph",
            WindUnit::Knots => "knots",
            WindUnit::KilometersPerHour => "km/h",
            WindUnit::MetersPerSecond => "m/s",
        }
    }
}

/// The operator's unit choices, one per measurement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub struct UnitPreferences {
    #[serde(default)]
    pub temperature: TemperatureUnit,
    #[serde(default)]
    pub pressure: PressureUnit,
    #[serde(default)]
    pub wind: WindUnit,
}

/// Rain collector hardware installed on the station.
///
/// The hub reports rain as tip counts; the collector code decides how
/// much water one tip represents. There is no safe guess for an unknown
/// code, so lookups fail instead of defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainCollector {
    /// Code 0: counts pass through unscaled, no unit.
    Passthrough,
    /// Code 1: 0.01 in per tip.
    HundredthInch,
    /// Code 2: 0.2 mm per tip.
    PointTwoMm,
    /// Code 3: 0.1 mm per tip.
    PointOneMm,
    /// Code 4: 0.001 in per tip.
    ThousandthInch,
}

impl RainCollector {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RainCollector::Passthrough),
            1 => Some(RainCollector::HundredthInch),
            2 => Some(RainCollector::PointTwoMm),
            3 => Some(RainCollector::PointOneMm),
            4 => Some(RainCollector::ThousandthInch),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            RainCollector::Passthrough => 0,
            RainCollector::HundredthInch => 1,
            RainCollector::PointTwoMm => 2,
            RainCollector::PointOneMm => 3,
            RainCollector::ThousandthInch => 4,
        }
    }

    /// Depth represented by one tip, in this collector's unit.
    pub fn tip_size(self) -> f64 {
        match self {
            RainCollector::Passthrough => 1.0,
            RainCollector::HundredthInch => 0.01,
            RainCollector::PointTwoMm => 0.2,
            RainCollector::PointOneMm => 0.1,
            RainCollector::ThousandthInch => 0.001,
        }
    }

    pub fn unit_label(self) -> &'static str {
        match self {
            RainCollector::Passthrough => "",
            RainCollector::HundredthInch | RainCollector::ThousandthInch => "in",
            RainCollector::PointTwoMm | RainCollector::PointOneMm => "mm",
        }
    }

    /// A depth measured in this collector's unit, expressed in inches.
    /// Passthrough counts are treated as inches already.
    pub fn depth_in_inches(self, value: f64) -> f64 {
        match self.unit_label() {
            "mm" => value / 25.4,
            _ => value,
        }
    }
}
