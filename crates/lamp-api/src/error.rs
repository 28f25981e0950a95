use thiserror::Error;

/// Top-level error type for the `lamp-api` crate.
///
/// Covers every failure mode of the gateway link: URL and TLS setup, the
/// WebSocket upgrade, frame encoding, and the read/write halves of an
/// established socket. `lamp-core` maps these into operation-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Setup ───────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket upgrade or handshake failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The upgrade did not complete in time.
    #[error("Connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Writing a frame to an established socket failed.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    /// Reading from an established socket failed.
    #[error("WebSocket read failed: {0}")]
    WebSocketRead(String),

    /// The gateway sent a close frame.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The socket was already closed locally.
    #[error("Transport already closed")]
    Closed,

    // ── Data ────────────────────────────────────────────────────────
    /// Encoding an outbound frame failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if the failure happened before a socket existed.
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_) | Self::Tls(_) | Self::WebSocketConnect(_) | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the error ends the read side of a live socket.
    pub fn is_link_down(&self) -> bool {
        matches!(
            self,
            Self::WebSocketRead(_) | Self::WebSocketClosed { .. } | Self::Closed
        )
    }
}
