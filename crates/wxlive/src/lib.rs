//! WeatherLink Live local API client.
//!
//! A WeatherLink Live hub exposes its sensor suite over two channels on the
//! local network: an HTTP endpoint polled for current conditions, and a UDP
//! broadcast stream announced through a short-lived real-time subscription.
//! [`HubLink`] drives both channels for a single hub and tracks its health.

pub mod error;
pub mod link;
pub mod wire;

pub use error::{HubError, Result};
pub use link::{next_poll_deadline, HubLink, LinkSettings, LinkState, LinkStatus};
pub use wire::{ConditionsReport, Envelope, RawCondition, RealTimeGrant, SensorType};
