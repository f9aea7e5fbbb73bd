//! Bridge between WeatherLink Live hubs and weather upload services.
//!
//! Readings arrive from one or more hubs over HTTP polls and UDP
//! broadcasts (via [`wxlive`]), get normalized into the operator's
//! preferred units, land in a sensor registry, and are republished on
//! their own schedules to CWOP, Weather Underground and PWSWeather.

pub mod config;
pub mod dispatcher;
pub mod normalize;
pub mod registry;
pub mod units;
pub mod upload;

pub use config::BridgeConfig;
pub use dispatcher::Dispatcher;
pub use registry::SensorRegistry;
