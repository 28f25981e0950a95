// ── Core error types ──
//
// Operation-level errors from lamp-core. Every variant carries a stable
// numeric code that the control surface reports verbatim. Transport
// errors are wrapped at the call site so each keeps the host or the
// operation it failed on.

use std::fmt;

use thiserror::Error;

/// Which control operation a send failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SetScene,
    SetChannelLevel,
    QueryChannelLevels,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SetScene => "SetScene",
            Self::SetChannelLevel => "SetChannelLevel",
            Self::QueryChannelLevels => "QueryChannelLevels",
        };
        f.write_str(name)
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Unable to connect to gateway at {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Error when disconnecting from gateway: {reason}")]
    Disconnect { reason: String },

    #[error("Gateway is not connected")]
    NotConnected,

    #[error("Bridge has not been set up")]
    NotSetUp,

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Error when sending {operation} request: {reason}")]
    Send { operation: Operation, reason: String },

    #[error("Invalid parameter {field}: {reason}")]
    InvalidParams { field: String, reason: String },

    // ── Queries ──────────────────────────────────────────────────────
    #[error("There are no channels to query (channel count is 0)")]
    NoChannelsConfigured,

    #[error("Another query is already waiting for an answer")]
    QueryInFlight,

    #[error("No answer for channel {channel} within {timeout_ms}ms")]
    QueryTimeout { channel: i64, timeout_ms: u64 },

    #[error("Query for channel {channel} abandoned: listener stopped")]
    QueryAbandoned { channel: i64 },
}

impl CoreError {
    /// Stable numeric code reported to control-surface callers.
    pub fn code(&self) -> i32 {
        match self {
            Self::Connect { .. } => -32000,
            Self::Send {
                operation: Operation::SetScene,
                ..
            } => -32001,
            Self::Send {
                operation: Operation::SetChannelLevel,
                ..
            } => -32002,
            Self::Disconnect { .. } => -32003,
            Self::Send {
                operation: Operation::QueryChannelLevels,
                ..
            } => -32004,
            Self::NoChannelsConfigured => -32005,
            Self::QueryInFlight => -32006,
            Self::QueryTimeout { .. } => -32007,
            Self::QueryAbandoned { .. } => -32008,
            Self::NotConnected => -32009,
            Self::NotSetUp => -32010,
            Self::InvalidParams { .. } => -32602,
        }
    }

    /// Returns `true` if reconnecting is the way to recover.
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::QueryAbandoned { .. } | Self::Send { .. }
        )
    }

    pub(crate) fn send(operation: Operation, err: &lamp_api::Error) -> Self {
        Self::Send {
            operation,
            reason: err.to_string(),
        }
    }

    pub(crate) fn connect(host: &str, err: &lamp_api::Error) -> Self {
        Self::Connect {
            host: host.to_owned(),
            reason: err.to_string(),
        }
    }
}
