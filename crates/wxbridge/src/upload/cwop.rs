//! CWOP sender: APRS-IS weather packets over a raw TCP socket.
//!
//! The exchange is fire-and-forget: log on, pause, send one position
//! report with the weather data block, pause, close. CWOP servers do
//! not acknowledge packets, so success means the socket survived.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::{Result, SendError, SourceReadings, SOFTWARE_TYPE};

pub const DEFAULT_HOST: &str = "cwop.aprs.net";
pub const DEFAULT_PORT: u16 = 14580;

/// Settle time after the login line and after the packet.
const SEND_PAUSE: Duration = Duration::from_secs(2);

/// Bound on the whole connect-login-send exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Degrees and zero-padded decimal minutes of one coordinate.
fn decdeg2dmm(degrees_decimal: f64, degree_width: usize) -> (String, String) {
    let total = degrees_decimal.abs();
    let degrees = total.floor();
    let minutes = (total - degrees) * 60.0;
    (
        format!("{:0width$}", degrees as u32, width = degree_width),
        format!("{:05.2}", minutes),
    )
}

/// APRS latitude: `DDMM.MMN` with 2-digit degrees.
pub fn aprs_latitude(degrees_decimal: f64) -> String {
    let (degrees, minutes) = decdeg2dmm(degrees_decimal, 2);
    let direction = if degrees_decimal >= 0.0 { 'N' } else { 'S' };
    format!("{}{}{}", degrees, minutes, direction)
}

/// APRS longitude: `DDDMM.MME` with 3-digit degrees.
pub fn aprs_longitude(degrees_decimal: f64) -> String {
    let (degrees, minutes) = decdeg2dmm(degrees_decimal, 3);
    let direction = if degrees_decimal >= 0.0 { 'E' } else { 'W' };
    format!("{}{}{}", degrees, minutes, direction)
}

/// Zero-padded integer field of the weather block; a missing value is
/// that many dots. Zero is a legitimate reading and renders as zeros.
fn str_or_dots(value: Option<f64>, width: usize) -> String {
    match value {
        Some(value) => format!("{:0width$}", value.round() as i64, width = width),
        None => ".".repeat(width),
    }
}

/// Inches of mercury to tenths of millibars, the APRS `b` field unit.
fn hg_to_tenths_mbar(inches: f64) -> f64 {
    inches / 0.029530 * 10.0
}

pub struct CwopSender {
    station_id: String,
    host: String,
    port: u16,
    /// Pre-formatted `lat/lon` position, fixed at construction.
    position: String,
    pause: Duration,
}

impl CwopSender {
    pub fn new(
        station_id: &str,
        host: Option<&str>,
        port: Option<u16>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            station_id: station_id.to_string(),
            host: host.unwrap_or(DEFAULT_HOST).to_string(),
            port: port.unwrap_or(DEFAULT_PORT),
            position: format!("{}/{}", aprs_latitude(latitude), aprs_longitude(longitude)),
            pause: SEND_PAUSE,
        }
    }

    /// Shorten the protocol pauses; tests talk to localhost stubs.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// The weather data block:
    /// `dir/spd g gust t temp r rain1h p rain24h P rainday h hum b baro`.
    pub fn weather_data(&self, readings: &SourceReadings<'_>) -> String {
        let hundredths = |v: f64| v * 100.0;
        format!(
            "{}/{}g{}t{}r{}p{}P{}h{}b{}",
            str_or_dots(readings.wind_dir("wind_dir_last"), 3),
            str_or_dots(readings.wind_mph("wind_speed_avg_last_1_min"), 3),
            str_or_dots(readings.wind_mph("wind_speed_hi_last_2_min"), 3),
            str_or_dots(readings.temp_f("temp"), 3),
            str_or_dots(readings.rain_inches("rain_60_min").map(hundredths), 3),
            str_or_dots(readings.rain_inches("rain_24_hr").map(hundredths), 3),
            str_or_dots(readings.rain_inches("rainfall_daily").map(hundredths), 3),
            str_or_dots(readings.humidity(), 2),
            str_or_dots(readings.pressure_inches_hg().map(hg_to_tenths_mbar), 5),
        )
    }

    /// A complete APRS position report with weather data and software tag.
    pub fn packet(&self, timestamp: DateTime<Utc>, weather_data: &str) -> String {
        format!(
            "{}>APRS,TCPIP*:@{}z{}_{}{}\r\n",
            self.station_id,
            timestamp.format("%d%H%M"),
            self.position,
            weather_data,
            SOFTWARE_TYPE
        )
    }

    pub async fn send_update(&self, readings: &SourceReadings<'_>) -> Result<()> {
        let weather_data = self.weather_data(readings);
        let packet = self.packet(Utc::now(), &weather_data);
        log::debug!("{}: packet = {}", self.station_id, packet.trim_end());

        tokio::time::timeout(EXCHANGE_TIMEOUT, self.exchange(&packet))
            .await
            .map_err(|_| {
                SendError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "APRS exchange timed out",
                ))
            })?
    }

    async fn exchange(&self, packet: &str) -> Result<()> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        let login = format!("user {} pass -1 vers {}\r\n", self.station_id, SOFTWARE_TYPE);
        stream.write_all(login.as_bytes()).await?;
        tokio::time::sleep(self.pause).await;

        stream.write_all(packet.as_bytes()).await?;
        tokio::time::sleep(self.pause).await;

        stream.shutdown().await?;
        Ok(())
    }
}
