//! Error taxonomy for hub communication.

/// Errors from talking to a WeatherLink Live hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Request never completed: connect failure, timeout, non-2xx status.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Body or datagram was not the JSON shape we expect.
    #[error("JSON error: {0}")]
    Parse(String),

    /// The hub answered with an error envelope.
    #[error("hub error (code {code}): {message}")]
    Protocol { code: i64, message: String },

    /// UDP socket operation failed.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
