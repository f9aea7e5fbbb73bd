//! Bridge configuration: units, station location, hubs, sensor bindings
//! and upload targets, loaded from a YAML file.
//!
//! A configuration that fails validation aborts startup; nothing runs
//! half-configured.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use wxlive::SensorType;

use crate::units::{RainCollector, UnitPreferences};
use crate::upload::SenderKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_http_port() -> u16 {
    80
}

fn default_poll_minutes() -> u64 {
    10
}

fn default_update_minutes() -> u64 {
    10
}

fn default_rain_collector() -> u8 {
    RainCollector::HundredthInch.code()
}

/// Station coordinates in decimal degrees, used for the APRS position
/// report.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StationLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// One WeatherLink Live hub to poll on the local network.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub name: String,
    pub address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_poll_minutes")]
    pub poll_minutes: u64,
    #[serde(default)]
    pub rounded_polling: bool,
    #[serde(default)]
    pub enable_udp: bool,
}

impl HubConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_minutes * 60)
    }
}

/// A sensor to bind: readings for this lsid are delivered and cached;
/// anything else is only remembered in the discovery table.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub lsid: u32,
    pub name: String,
    pub kind: SensorType,
}

/// One upload target. `iss_sensor` and `baro_sensor` name the configured
/// sensors the sender reads its fields from.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub kind: SenderKind,
    pub station_id: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_update_minutes")]
    pub update_minutes: u64,
    pub iss_sensor: String,
    pub baro_sensor: String,
}

impl UploadConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_minutes * 60)
    }
}

/// The whole bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub units: UnitPreferences,
    #[serde(default)]
    pub station: Option<StationLocation>,
    /// Rain collector code 0-4; a condition's own `rain_size` field wins
    /// over this when present.
    #[serde(default = "default_rain_collector")]
    pub rain_collector: u8,
    pub hubs: Vec<HubConfig>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub uploads: Vec<UploadConfig>,
}

impl BridgeConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration YAML.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: BridgeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn sensor_by_name(&self, name: &str) -> Option<&SensorConfig> {
        self.sensors.iter().find(|sensor| sensor.name == name)
    }

    /// The configured rain collector. `validate` has already checked the
    /// code, so this only fails on a hand-built config.
    pub fn collector(&self) -> Result<RainCollector> {
        RainCollector::from_code(self.rain_collector).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "rain_collector must be 0-4, got {}",
                self.rain_collector
            ))
        })
    }

    fn validate(&self) -> Result<()> {
        if self.hubs.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one hub must be configured".to_string(),
            ));
        }

        let mut hub_names = HashSet::new();
        for hub in &self.hubs {
            if hub.name.is_empty() {
                return Err(ConfigError::Invalid("hub name must not be empty".to_string()));
            }
            if !hub_names.insert(hub.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate hub name '{}'",
                    hub.name
                )));
            }
            if hub.poll_minutes < 1 {
                return Err(ConfigError::Invalid(format!(
                    "hub '{}': poll_minutes must be at least 1",
                    hub.name
                )));
            }
        }

        let mut lsids = HashSet::new();
        for sensor in &self.sensors {
            if !lsids.insert(sensor.lsid) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sensor lsid {}",
                    sensor.lsid
                )));
            }
        }

        self.collector()?;

        for upload in &self.uploads {
            if upload.update_minutes < 1 {
                return Err(ConfigError::Invalid(format!(
                    "upload '{}': update_minutes must be at least 1",
                    upload.station_id
                )));
            }
            self.check_sensor_ref(upload, &upload.iss_sensor, SensorType::Iss)?;
            self.check_sensor_ref(upload, &upload.baro_sensor, SensorType::Barometric)?;
            if upload.kind == SenderKind::Cwop && self.station.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "upload '{}': CWOP requires a station location",
                    upload.station_id
                )));
            }
        }

        Ok(())
    }

    fn check_sensor_ref(&self, upload: &UploadConfig, name: &str, want: SensorType) -> Result<()> {
        match self.sensor_by_name(name) {
            Some(sensor) if sensor.kind == want => Ok(()),
            Some(sensor) => Err(ConfigError::Invalid(format!(
                "upload '{}': sensor '{}' is {}, expected {}",
                upload.station_id,
                name,
                sensor.kind.label(),
                want.label()
            ))),
            None => Err(ConfigError::Invalid(format!(
                "upload '{}': unknown sensor '{}'",
                upload.station_id, name
            ))),
        }
    }
}
