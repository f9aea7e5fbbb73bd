//! Test helpers: a canned localhost stand-in for a WeatherLink Live hub.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One pre-baked HTTP response.
pub struct CannedResponse {
    pub status: String,
    pub body: String,
}

impl CannedResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            status: "200 OK".to_string(),
            body: body.to_string(),
        }
    }

    pub fn with_status(status: &str, body: &str) -> Self {
        Self {
            status: status.to_string(),
            body: body.to_string(),
        }
    }
}

/// Minimal HTTP/1.1 server that answers connections with scripted
/// responses in order, one per connection, then stops accepting.
pub struct StubHub {
    pub port: u16,
    handle: JoinHandle<()>,
}

impl StubHub {
    pub async fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub hub");
        let port = listener.local_addr().expect("stub hub addr").port();

        let handle = tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                // Consume the request head; GET requests fit one read.
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;

                let payload = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.status,
                    response.body.len(),
                    response.body
                );
                let _ = stream.write_all(payload.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { port, handle }
    }

    /// Serve the same 200 response for `count` connections.
    pub async fn repeat(body: &str, count: usize) -> Self {
        let responses = (0..count).map(|_| CannedResponse::ok(body)).collect();
        Self::start(responses).await
    }
}

impl Drop for StubHub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A conditions envelope with one ISS and one barometric record.
pub fn conditions_body(did: &str, ts: i64) -> String {
    format!(
        r#"{{"data":{{"did":"{}","ts":{},"conditions":[
            {{"lsid":48308,"data_structure_type":1,"txid":1,"temp":72.5,"hum":40,"wind_speed_last":3.0}},
            {{"lsid":48307,"data_structure_type":3,"bar_sea_level":29.92,"bar_absolute":29.05}}
        ]}},"error":null}}"#,
        did, ts
    )
}

/// A real-time grant envelope for the given broadcast port.
pub fn grant_body(port: u16, duration: u64) -> String {
    format!(
        r#"{{"data":{{"broadcast_port":{},"duration":{}}},"error":null}}"#,
        port, duration
    )
}

/// Reserve a UDP port by binding to an ephemeral one and releasing it.
pub fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("reserve udp port");
    let port = socket.local_addr().expect("udp addr").port();
    drop(socket);
    port
}
