//! Connection to a single WeatherLink Live hub.
//!
//! A [`HubLink`] polls `/v1/current_conditions` on its own schedule and,
//! when real-time mode is enabled, negotiates a UDP broadcast lease via
//! `/v1/real_time`. The two channels fail independently: a dead socket
//! never delays the next HTTP poll and vice versa.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{HubError, Result};
use crate::wire::{ConditionsReport, Envelope, RawCondition, RealTimeGrant};

/// Hub HTTP requests are answered from RAM; anything slower than this
/// means the hub is gone.
const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for one UDP receive attempt. Keeps the dispatcher loop
/// responsive while still draining bursts quickly.
const UDP_RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum broadcast datagram size per the hub's interface definition.
const MAX_DATAGRAM: usize = 2048;

/// How a link is created: identity, endpoint, schedule.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Display name used in logs and state listings.
    pub name: String,
    /// Hub hostname or IP on the local network.
    pub address: String,
    pub http_port: u16,
    pub poll_interval: Duration,
    /// Align poll deadlines to wall-clock multiples of the interval.
    pub rounded_polling: bool,
    /// Negotiate the UDP broadcast lease after successful polls.
    pub udp_enabled: bool,
}

/// Observable phase of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    PollInFlight,
    UdpNegotiating,
    UdpActive,
    Error,
}

/// Health classification shown to operators, one per link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Ok,
    HttpError,
    JsonError,
    ServerError,
    SocketError,
    Off,
}

impl LinkStatus {
    /// Map a hub error onto the status it displays as.
    pub fn classify(err: &HubError) -> Self {
        match err {
            HubError::Transport(_) => LinkStatus::HttpError,
            HubError::Parse(_) => LinkStatus::JsonError,
            HubError::Protocol { .. } => LinkStatus::ServerError,
            HubError::Socket(_) => LinkStatus::SocketError,
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkStatus::Ok => "OK",
            LinkStatus::HttpError => "HTTP Error",
            LinkStatus::JsonError => "JSON Error",
            LinkStatus::ServerError => "Server Error",
            LinkStatus::SocketError => "Socket Error",
            LinkStatus::Off => "Off",
        };
        write!(f, "{}", s)
    }
}

/// Next wall-clock-aligned deadline strictly after `now`.
///
/// With a 600s interval this yields :00/:10/:20 boundaries regardless of
/// when the process started, so restarts keep the same poll cadence.
pub fn next_poll_deadline(now: u64, interval: u64) -> u64 {
    (now / interval) * interval + interval
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One hub connection: HTTP poll schedule plus optional UDP listener.
#[derive(Debug)]
pub struct HubLink {
    settings: LinkSettings,
    client: reqwest::Client,
    state: LinkState,
    status: LinkStatus,
    /// At most one socket per link for the whole lease lifetime.
    socket: Option<UdpSocket>,
    /// Epoch seconds of the next HTTP poll.
    next_poll: u64,
    /// Hub device id from the last successful exchange.
    did: Option<String>,
    /// Hub timestamp of the last successful exchange.
    last_contact: Option<i64>,
}

impl HubLink {
    /// Create a link. Without rounded polling the first poll fires
    /// immediately; with it, polls wait for the next aligned boundary.
    pub fn new(settings: LinkSettings) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let now = epoch_secs();
        let interval = settings.poll_interval.as_secs().max(1);
        let next_poll = if settings.rounded_polling {
            next_poll_deadline(now, interval)
        } else {
            now
        };

        Ok(Self {
            settings,
            client,
            state: LinkState::Idle,
            status: LinkStatus::Off,
            socket: None,
            next_poll,
            did: None,
            last_contact: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn did(&self) -> Option<&str> {
        self.did.as_deref()
    }

    pub fn last_contact(&self) -> Option<i64> {
        self.last_contact
    }

    pub fn next_poll(&self) -> u64 {
        self.next_poll
    }

    pub fn udp_active(&self) -> bool {
        self.socket.is_some()
    }

    pub fn udp_enabled(&self) -> bool {
        self.settings.udp_enabled
    }

    /// Whether the HTTP poll deadline has elapsed.
    pub fn poll_due(&self, now: u64) -> bool {
        now >= self.next_poll
    }

    /// Poll `/v1/current_conditions` once.
    ///
    /// The next deadline is advanced before the request goes out, so a
    /// failed poll waits for its natural slot instead of retrying hot.
    pub async fn poll(&mut self) -> Result<Vec<RawCondition>> {
        self.schedule_next(epoch_secs());
        self.state = LinkState::PollInFlight;
        log::debug!("{}: polling current conditions", self.settings.name);

        let report: ConditionsReport = match self.fetch("/v1/current_conditions").await {
            Ok(report) => report,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.note_contact(&report);
        self.status = LinkStatus::Ok;
        self.state = self.resting_state();
        Ok(report.conditions)
    }

    /// Request (or renew) the real-time broadcast lease.
    ///
    /// Opens the UDP socket on first success; later calls only refresh
    /// the lease on the hub side. A 409 from the hub means no sensor on
    /// this station broadcasts, which is not an error. Returns whether
    /// the broadcast channel is live.
    pub async fn start_realtime(&mut self) -> Result<bool> {
        if !self.settings.udp_enabled {
            return Ok(false);
        }
        if self.socket.is_none() {
            self.state = LinkState::UdpNegotiating;
        }

        let grant: RealTimeGrant = match self.fetch("/v1/real_time").await {
            Ok(grant) => grant,
            Err(HubError::Protocol { code: 409, message }) => {
                log::debug!(
                    "{}: no broadcast-capable sensors on this hub: {}",
                    self.settings.name,
                    message
                );
                self.state = self.resting_state();
                return Ok(false);
            }
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        if self.socket.is_none() {
            match bind_reusable_udp(grant.broadcast_port) {
                Ok(socket) => {
                    log::info!(
                        "{}: real-time lease granted for {}s, listening on UDP port {}",
                        self.settings.name,
                        grant.duration,
                        grant.broadcast_port
                    );
                    self.socket = Some(socket);
                }
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            }
        } else {
            log::debug!(
                "{}: real-time lease renewed for {}s",
                self.settings.name,
                grant.duration
            );
        }

        self.state = LinkState::UdpActive;
        Ok(true)
    }

    /// One bounded receive attempt on the broadcast socket.
    ///
    /// `Ok(None)` means no socket or nothing pending within the receive
    /// window. The poll schedule is never touched here.
    pub async fn receive_udp(&mut self) -> Result<Option<Vec<RawCondition>>> {
        let received = {
            let socket = match self.socket.as_ref() {
                Some(socket) => socket,
                None => return Ok(None),
            };
            let mut buf = [0u8; MAX_DATAGRAM];
            match tokio::time::timeout(UDP_RECV_TIMEOUT, socket.recv_from(&mut buf)).await {
                Err(_elapsed) => return Ok(None),
                Ok(Err(e)) => Err(e),
                Ok(Ok((len, _peer))) => Ok(buf[..len].to_vec()),
            }
        };

        let datagram = match received {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = HubError::Socket(e);
                self.fail(&err);
                return Err(err);
            }
        };

        let report: ConditionsReport = match serde_json::from_slice(&datagram) {
            Ok(report) => report,
            Err(e) => {
                let err = HubError::Parse(e.to_string());
                self.fail(&err);
                return Err(err);
            }
        };

        self.note_contact(&report);
        Ok(Some(report.conditions))
    }

    /// Close the broadcast socket (if open) and mark the link off.
    pub fn shutdown(&mut self) {
        if self.socket.take().is_some() {
            log::info!("{}: closed UDP socket", self.settings.name);
        }
        self.status = LinkStatus::Off;
        self.state = LinkState::Idle;
    }

    /// GET an endpoint and unwrap its envelope.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!(
            "http://{}:{}{}",
            self.settings.address, self.settings.http_port, path
        );
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = response.text().await?;
        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| HubError::Parse(e.to_string()))?;
        envelope.into_result()
    }

    fn schedule_next(&mut self, now: u64) {
        let interval = self.settings.poll_interval.as_secs().max(1);
        self.next_poll = if self.settings.rounded_polling {
            next_poll_deadline(now, interval)
        } else {
            now + interval
        };
    }

    fn note_contact(&mut self, report: &ConditionsReport) {
        self.did = Some(report.did.clone());
        self.last_contact = Some(report.ts);
    }

    fn fail(&mut self, err: &HubError) {
        self.status = LinkStatus::classify(err);
        self.state = LinkState::Error;
    }

    /// State to settle into after a successful exchange.
    fn resting_state(&self) -> LinkState {
        if self.socket.is_some() {
            LinkState::UdpActive
        } else {
            LinkState::Idle
        }
    }
}

/// Bind a UDP socket with address reuse so several listeners (or a
/// restarted process) can share the hub's broadcast port.
fn bind_reusable_udp(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(rounded: bool) -> LinkSettings {
        LinkSettings {
            name: "backyard".to_string(),
            address: "127.0.0.1".to_string(),
            http_port: 1,
            poll_interval: Duration::from_secs(600),
            rounded_polling: rounded,
            udp_enabled: false,
        }
    }

    #[test]
    fn deadline_rounds_up_to_interval_boundary() {
        assert_eq!(next_poll_deadline(1000, 600), 1200);
        assert_eq!(next_poll_deadline(600, 600), 1200);
        assert_eq!(next_poll_deadline(1199, 600), 1200);
        assert_eq!(next_poll_deadline(1200, 600), 1800);
    }

    #[test]
    fn deadline_rounds_for_any_point_in_window() {
        for now in [600u64, 601, 900, 1000, 1199] {
            assert_eq!(next_poll_deadline(now, 600), 1200, "now={}", now);
        }
    }

    #[test]
    fn unrounded_link_polls_immediately() {
        let link = HubLink::new(settings(false)).unwrap();
        assert!(link.poll_due(epoch_secs()));
    }

    #[test]
    fn rounded_link_waits_for_boundary() {
        let link = HubLink::new(settings(true)).unwrap();
        let now = epoch_secs();
        assert!(link.next_poll() > now);
        assert_eq!(link.next_poll() % 600, 0);
    }

    #[test]
    fn status_display_strings() {
        assert_eq!(LinkStatus::Ok.to_string(), "OK");
        assert_eq!(LinkStatus::HttpError.to_string(), "HTTP Error");
        assert_eq!(LinkStatus::JsonError.to_string(), "JSON Error");
        assert_eq!(LinkStatus::ServerError.to_string(), "Server Error");
        assert_eq!(LinkStatus::SocketError.to_string(), "Socket Error");
        assert_eq!(LinkStatus::Off.to_string(), "Off");
    }

    #[test]
    fn classify_maps_errors_to_statuses() {
        let parse = HubError::Parse("bad".to_string());
        assert_eq!(LinkStatus::classify(&parse), LinkStatus::JsonError);

        let protocol = HubError::Protocol {
            code: 500,
            message: "boom".to_string(),
        };
        assert_eq!(LinkStatus::classify(&protocol), LinkStatus::ServerError);

        let socket = HubError::Socket(std::io::Error::other("closed"));
        assert_eq!(LinkStatus::classify(&socket), LinkStatus::SocketError);
    }

    #[tokio::test]
    async fn failed_poll_sets_http_error_and_keeps_schedule() {
        // Port 1 refuses connections, so the transport layer fails fast.
        let mut link = HubLink::new(settings(false)).unwrap();
        let before = epoch_secs();

        let result = link.poll().await;
        assert!(matches!(result, Err(HubError::Transport(_))));
        assert_eq!(link.status(), LinkStatus::HttpError);
        assert_eq!(link.state(), LinkState::Error);
        // Deadline advanced by a full interval despite the failure.
        assert!(link.next_poll() >= before + 600);
    }

    #[tokio::test]
    async fn receive_without_socket_is_empty() {
        let mut link = HubLink::new(settings(false)).unwrap();
        let got = link.receive_udp().await.unwrap();
        assert!(got.is_none());
        assert_eq!(link.status(), LinkStatus::Off);
    }

    #[tokio::test]
    async fn realtime_disabled_is_a_no_op() {
        let mut link = HubLink::new(settings(false)).unwrap();
        assert!(!link.start_realtime().await.unwrap());
        assert!(!link.udp_active());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut link = HubLink::new(settings(false)).unwrap();
        link.shutdown();
        link.shutdown();
        assert_eq!(link.status(), LinkStatus::Off);
        assert_eq!(link.state(), LinkState::Idle);
        assert!(!link.udp_active());
    }
}
