//! Test helpers: canned localhost stand-ins for the hub and the upload
//! services, plus pre-populated registries.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use wxbridge::normalize::{ReadingEntry, StateValue};
use wxbridge::registry::{LogSink, SensorRegistry};
use wxlive::SensorType;

/// Minimal HTTP/1.1 server that answers connections with scripted
/// bodies in order, recording each request line for assertions.
pub struct StubService {
    pub port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl StubService {
    pub async fn start(bodies: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub service");
        let port = listener.local_addr().expect("stub service addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let requests = requests.clone();
            async move {
                for body in bodies {
                    let (mut stream, _) = match listener.accept().await {
                        Ok(conn) => conn,
                        Err(_) => return,
                    };
                    // Consume the request head; GET requests fit one read.
                    let mut buf = [0u8; 8192];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]);
                    if let Some(line) = head.lines().next() {
                        requests.lock().unwrap().push(line.to_string());
                    }

                    let payload = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(payload.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            }
        });

        Self {
            port,
            requests,
            handle,
        }
    }

    /// Serve the same body for `count` connections.
    pub async fn repeat(body: &str, count: usize) -> Self {
        let bodies = (0..count).map(|_| body.to_string()).collect();
        Self::start(bodies).await
    }

    /// Request lines seen so far, e.g. `GET /path?a=b HTTP/1.1`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Drop for StubService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Accept one connection and capture everything sent until the peer
/// shuts its write side down.
pub async fn capture_one_connection() -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind capture");
    let port = listener.local_addr().expect("capture addr").port();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.expect("read");
        String::from_utf8_lossy(&buf).to_string()
    });
    (port, handle)
}

/// Poll `check` until it holds or the timeout elapses.
pub async fn wait_until(mut check: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

/// A current-conditions envelope wrapping the given condition records.
pub fn conditions_envelope(did: &str, ts: i64, conditions: &str) -> String {
    format!(
        r#"{{"data":{{"did":"{}","ts":{},"conditions":[{}]}},"error":null}}"#,
        did, ts, conditions
    )
}

/// A real-time grant envelope for the given broadcast port.
pub fn grant_envelope(port: u16, duration: u64) -> String {
    format!(
        r#"{{"data":{{"broadcast_port":{},"duration":{}}},"error":null}}"#,
        port, duration
    )
}

/// A broadcast datagram body: same conditions shape, no envelope.
pub fn broadcast_report(did: &str, ts: i64, conditions: &str) -> String {
    format!(
        r#"{{"did":"{}","ts":{},"conditions":[{}]}}"#,
        did, ts, conditions
    )
}

/// Reserve a UDP port by binding to an ephemeral one and releasing it.
pub fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("reserve udp port");
    let port = socket.local_addr().expect("udp addr").port();
    drop(socket);
    port
}

pub fn reading_entry(key: &str, value: f64) -> ReadingEntry {
    ReadingEntry {
        key: key.to_string(),
        value: StateValue::Number(value),
        decimal_places: Some(1),
        display: None,
    }
}

/// A registry with one bound ISS (lsid 101) and one bound barometric
/// sensor (lsid 201), caching a typical set of readings in the default
/// imperial units.
pub fn populated_registry() -> SensorRegistry {
    let mut registry = SensorRegistry::new(std::env::temp_dir().join("wxbridge-test-unused.json"));
    registry.bind(101, SensorType::Iss, Box::new(LogSink::new("outdoor")));
    registry.bind(201, SensorType::Barometric, Box::new(LogSink::new("pressure")));
    registry.dispatch(
        101,
        &[
            reading_entry("temp", 72.5),
            reading_entry("dew_point", 54.3),
            reading_entry("hum", 40.0),
            reading_entry("wind_dir_last", 270.0),
            reading_entry("wind_speed_avg_last_1_min", 10.0),
            reading_entry("wind_speed_hi_last_2_min", 15.0),
            reading_entry("wind_speed_avg_last_10_min", 8.0),
            reading_entry("wind_dir_scalar_avg_last_10_min", 265.0),
            reading_entry("rain_60_min", 0.0),
            reading_entry("rain_24_hr", 0.25),
            reading_entry("rainfall_daily", 0.25),
            reading_entry("rain_rate_last", 0.0),
        ],
    );
    registry.dispatch(201, &[reading_entry("bar_absolute", 29.05)]);
    registry
}
