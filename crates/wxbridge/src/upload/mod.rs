//! Upload senders: republish cached readings to weather services.
//!
//! Each sender owns a deadline and a status. `maybe_send` advances the
//! deadline before the attempt, so a failed upload waits for the next
//! natural cycle instead of retrying hot. The registry cache holds
//! values in the operator's display units; senders convert back to the
//! imperial units every service expects.

use serde::Deserialize;
use std::time::Duration;

use crate::registry::SensorRegistry;
use crate::units::{RainCollector, UnitPreferences};

pub mod cwop;
pub mod pws;
pub mod wunderground;

pub use cwop::CwopSender;
pub use pws::PwsSender;
pub use wunderground::WundergroundSender;

/// Identifier reported to every upload service.
pub const SOFTWARE_TYPE: &str = concat!("wxbridge ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service rejected update: {0}")]
    Provider(String),

    #[error("no data cached for sensor {0}")]
    MissingData(u32),

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SendError>;

/// Which service an upload target talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Cwop,
    Wunderground,
    PwsWeather,
}

impl SenderKind {
    pub fn label(self) -> &'static str {
        match self {
            SenderKind::Cwop => "CWOP",
            SenderKind::Wunderground => "Weather Underground",
            SenderKind::PwsWeather => "PWSWeather",
        }
    }
}

/// Health classification shown to operators, one per sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderStatus {
    Ok,
    RequestError,
    DataError,
    MissingData,
    Off,
}

impl SenderStatus {
    /// Map a send error onto the status it displays as.
    pub fn classify(err: &SendError) -> Self {
        match err {
            SendError::Transport(_) | SendError::Io(_) => SenderStatus::RequestError,
            SendError::Provider(_) => SenderStatus::DataError,
            SendError::MissingData(_) => SenderStatus::MissingData,
        }
    }
}

impl std::fmt::Display for SenderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SenderStatus::Ok => "OK",
            SenderStatus::RequestError => "Request Error",
            SenderStatus::DataError => "Data Error",
            SenderStatus::MissingData => "Missing Data",
            SenderStatus::Off => "Off",
        };
        write!(f, "{}", s)
    }
}

/// Imperial view of the cached values a sender reads for one update.
///
/// Keys are looked up live against the registry cache; a key that was
/// never reported yields `None` and the sender leaves that field out.
pub struct SourceReadings<'a> {
    registry: &'a SensorRegistry,
    iss_lsid: u32,
    baro_lsid: u32,
    units: UnitPreferences,
    collector: RainCollector,
}

impl<'a> SourceReadings<'a> {
    pub fn new(
        registry: &'a SensorRegistry,
        iss_lsid: u32,
        baro_lsid: u32,
        units: UnitPreferences,
        collector: RainCollector,
    ) -> Self {
        Self {
            registry,
            iss_lsid,
            baro_lsid,
            units,
            collector,
        }
    }

    fn iss_value(&self, key: &str) -> Option<f64> {
        self.registry.state_f64(self.iss_lsid, key)
    }

    /// Temperature-family field in Fahrenheit.
    pub fn temp_f(&self, key: &str) -> Option<f64> {
        self.iss_value(key)
            .map(|v| self.units.temperature.to_fahrenheit(v))
    }

    /// Wind-speed field in miles per hour.
    pub fn wind_mph(&self, key: &str) -> Option<f64> {
        self.iss_value(key).map(|v| self.units.wind.to_mph(v))
    }

    /// Wind direction in degrees, unit-free.
    pub fn wind_dir(&self, key: &str) -> Option<f64> {
        self.iss_value(key)
    }

    /// Relative humidity in percent, unit-free.
    pub fn humidity(&self) -> Option<f64> {
        self.iss_value("hum")
    }

    /// Rain-amount field in inches.
    pub fn rain_inches(&self, key: &str) -> Option<f64> {
        self.iss_value(key)
            .map(|v| self.collector.depth_in_inches(v))
    }

    /// Absolute barometric pressure in inches of mercury.
    pub fn pressure_inches_hg(&self) -> Option<f64> {
        self.registry
            .state_f64(self.baro_lsid, "bar_absolute")
            .map(|v| self.units.pressure.to_inches_hg(v))
    }
}

/// Fixed-precision rendering for numeric query parameters.
pub(crate) fn query_value(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

pub(crate) fn push_param(
    params: &mut Vec<(&'static str, String)>,
    key: &'static str,
    value: Option<String>,
) {
    if let Some(value) = value {
        params.push((key, value));
    }
}

/// Provider-specific half of a sender.
pub enum SenderVariant {
    Cwop(CwopSender),
    Wunderground(WundergroundSender),
    PwsWeather(PwsSender),
}

/// Scheduling and status shared by every sender kind.
#[derive(Debug, Clone)]
pub struct SenderSettings {
    /// Display name used in logs.
    pub name: String,
    pub update_interval: Duration,
    /// Source sensor for wind, temperature, humidity and rain fields.
    pub iss_lsid: u32,
    /// Source sensor for barometric pressure.
    pub baro_lsid: u32,
    pub units: UnitPreferences,
    pub collector: RainCollector,
}

pub struct Sender {
    settings: SenderSettings,
    interval_secs: u64,
    next_update: u64,
    status: SenderStatus,
    variant: SenderVariant,
}

impl Sender {
    /// A sender that is immediately due, so the first cycle with cached
    /// data uploads right away.
    pub fn new(settings: SenderSettings, variant: SenderVariant) -> Self {
        let interval_secs = settings.update_interval.as_secs().max(1);
        Self {
            settings,
            interval_secs,
            next_update: 0,
            status: SenderStatus::Off,
            variant,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn status(&self) -> SenderStatus {
        self.status
    }

    pub fn next_update(&self) -> u64 {
        self.next_update
    }

    pub fn due(&self, now: u64) -> bool {
        now >= self.next_update
    }

    /// Run one update if the deadline elapsed; otherwise a no-op.
    pub async fn maybe_send(&mut self, now: u64, registry: &SensorRegistry) -> SenderStatus {
        if !self.due(now) {
            return self.status;
        }
        self.next_update = now + self.interval_secs;

        self.status = match self.send_now(registry).await {
            Ok(()) => {
                log::debug!("{}: update accepted", self.settings.name);
                SenderStatus::Ok
            }
            Err(err) => {
                let status = SenderStatus::classify(&err);
                match status {
                    SenderStatus::MissingData => {
                        log::warn!("{}: update skipped: {}", self.settings.name, err)
                    }
                    _ => log::error!("{}: update failed: {}", self.settings.name, err),
                }
                status
            }
        };
        self.status
    }

    async fn send_now(&self, registry: &SensorRegistry) -> Result<()> {
        if !registry.has_states(self.settings.iss_lsid) {
            return Err(SendError::MissingData(self.settings.iss_lsid));
        }
        if !registry.has_states(self.settings.baro_lsid) {
            return Err(SendError::MissingData(self.settings.baro_lsid));
        }
        log::info!("{}: sending update", self.settings.name);

        let readings = SourceReadings::new(
            registry,
            self.settings.iss_lsid,
            self.settings.baro_lsid,
            self.settings.units,
            self.settings.collector,
        );
        match &self.variant {
            SenderVariant::Cwop(sender) => sender.send_update(&readings).await,
            SenderVariant::Wunderground(sender) => sender.send_update(&readings).await,
            SenderVariant::PwsWeather(sender) => sender.send_update(&readings).await,
        }
    }

    /// Mark the sender stopped. No further sends happen after the loop
    /// exits, so this is purely for the final status.
    pub fn set_off(&mut self) {
        self.status = SenderStatus::Off;
    }
}
