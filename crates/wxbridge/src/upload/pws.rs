//! PWSWeather sender. Same query-string shape as Weather Underground
//! with a different endpoint, success marker and rain semantics: the
//! `rainin` parameter carries the current rain rate, not an accumulation.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{push_param, query_value, Result, SendError, SourceReadings, SOFTWARE_TYPE};

pub const DEFAULT_HOST: &str = "www.pwsweather.com";
pub const DEFAULT_PORT: u16 = 80;

const UPDATE_PATH: &str = "/pwsupdate/pwsupdate.php";
const SUCCESS_MARKER: &str = "Logged";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PwsSender {
    station_id: String,
    password: String,
    host: String,
    port: u16,
    client: reqwest::Client,
}

impl PwsSender {
    pub fn new(
        station_id: &str,
        password: &str,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            station_id: station_id.to_string(),
            password: password.to_string(),
            host: host.unwrap_or(DEFAULT_HOST).to_string(),
            port: port.unwrap_or(DEFAULT_PORT),
            client,
        })
    }

    /// Query parameters for one update. Fields without a cached value
    /// are left out.
    pub fn params(
        &self,
        timestamp: DateTime<Utc>,
        readings: &SourceReadings<'_>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("ID", self.station_id.clone()),
            ("PASSWORD", self.password.clone()),
            ("action", "updateraw".to_string()),
            ("softwaretype", SOFTWARE_TYPE.to_string()),
            ("dateutc", timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
        ];
        let fixed = |decimals: usize| move |v: f64| query_value(v, decimals);

        push_param(&mut params, "tempf", readings.temp_f("temp").map(fixed(1)));
        push_param(
            &mut params,
            "baromin",
            readings.pressure_inches_hg().map(fixed(2)),
        );
        push_param(
            &mut params,
            "dewptf",
            readings.temp_f("dew_point").map(fixed(1)),
        );
        push_param(&mut params, "humidity", readings.humidity().map(fixed(0)));
        push_param(
            &mut params,
            "rainin",
            readings.rain_inches("rain_rate_last").map(fixed(2)),
        );
        push_param(
            &mut params,
            "dailyrainin",
            readings.rain_inches("rainfall_daily").map(fixed(2)),
        );
        push_param(
            &mut params,
            "monthrainin",
            readings.rain_inches("rainfall_monthly").map(fixed(2)),
        );
        push_param(
            &mut params,
            "yearrainin",
            readings.rain_inches("rainfall_year").map(fixed(2)),
        );
        push_param(
            &mut params,
            "windspeedmph",
            readings.wind_mph("wind_speed_avg_last_10_min").map(fixed(1)),
        );
        push_param(
            &mut params,
            "windgustmph",
            readings.wind_mph("wind_speed_hi_last_10_min").map(fixed(1)),
        );
        push_param(
            &mut params,
            "winddir",
            readings
                .wind_dir("wind_dir_scalar_avg_last_10_min")
                .map(fixed(0)),
        );
        params
    }

    pub async fn send_update(&self, readings: &SourceReadings<'_>) -> Result<()> {
        let url = format!("http://{}:{}{}", self.host, self.port, UPDATE_PATH);
        let params = self.params(Utc::now(), readings);

        let response = self.client.get(&url).query(&params).send().await?;
        let body = response.text().await?;
        if body.contains(SUCCESS_MARKER) {
            Ok(())
        } else {
            Err(SendError::Provider(body.trim().to_string()))
        }
    }
}
