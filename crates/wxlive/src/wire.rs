//! Wire format of the WeatherLink Live local API.
//!
//! Both HTTP endpoints answer with an `{error, data}` envelope. UDP
//! broadcast datagrams carry a bare [`ConditionsReport`] without the
//! envelope. Condition records keep their sensor-specific fields in a
//! flattened map because the set of keys varies by data structure type
//! and firmware revision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error half of the API envelope.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

/// Response envelope used by both `/v1/current_conditions` and
/// `/v1/real_time`. Exactly one of `error` and `data` is populated.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub error: Option<ApiError>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Collapse the envelope into its payload or the hub's reported error.
    pub fn into_result(self) -> crate::error::Result<T> {
        if let Some(err) = self.error {
            return Err(crate::error::HubError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        self.data.ok_or_else(|| {
            crate::error::HubError::Parse("envelope carries neither data nor error".to_string())
        })
    }
}

/// A batch of conditions from one hub, over either channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionsReport {
    /// Hub device id, e.g. `001D0A100021`.
    pub did: String,
    /// Hub-side epoch seconds when the batch was generated.
    pub ts: i64,
    pub conditions: Vec<RawCondition>,
}

/// Grant returned by `/v1/real_time`: the hub will broadcast UDP
/// datagrams on `broadcast_port` for `duration` seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RealTimeGrant {
    pub broadcast_port: u16,
    pub duration: u64,
}

/// One condition record as received from the hub. Readings stay in the
/// hub's native units (Fahrenheit, inches of mercury, miles per hour)
/// until normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCondition {
    /// Logical sensor id, stable across reboots.
    pub lsid: u32,
    pub data_structure_type: u8,
    /// Remaining sensor fields; values may be numbers, strings or null.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl RawCondition {
    /// The sensor category this record belongs to, if the type code is known.
    pub fn sensor_type(&self) -> Option<SensorType> {
        SensorType::from_code(self.data_structure_type)
    }

    /// Numeric view of a field. Strings and nulls return `None`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }
}

/// Sensor categories reported by the hub via `data_structure_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Integrated sensor suite: wind, rain, temperature, humidity.
    Iss,
    LeafSoil,
    Barometric,
    TempHumidity,
}

impl SensorType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SensorType::Iss),
            2 => Some(SensorType::LeafSoil),
            3 => Some(SensorType::Barometric),
            4 => Some(SensorType::TempHumidity),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            SensorType::Iss => 1,
            SensorType::LeafSoil => 2,
            SensorType::Barometric => 3,
            SensorType::TempHumidity => 4,
        }
    }

    /// Label used in sensor listings.
    pub fn label(&self) -> &'static str {
        match self {
            SensorType::Iss => "ISS",
            SensorType::LeafSoil => "Leaf/Soil",
            SensorType::Barometric => "Barometric",
            SensorType::TempHumidity => "Temp/Humidity",
        }
    }
}
