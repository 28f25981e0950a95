// ── Runtime bridge configuration ──
//
// These types describe how to reach a gateway and where to send
// notifications. They carry credential data and timing, but never touch
// disk: the binary builds a `BridgeConfig` (from a Setup call or the
// config file) and hands it in.

use std::time::Duration;

use lamp_api::{Credentials, TlsMode};
use secrecy::SecretString;

use crate::error::CoreError;

/// Timing knobs for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Upper bound on waiting for one channel answer.
    pub query_timeout: Duration,
    /// Delay before forwarding a scene-related notification.
    pub settle_interval: Duration,
    /// Upper bound on the WebSocket upgrade.
    pub connect_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            settle_interval: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Where state-change webhooks go.
#[derive(Debug, Clone)]
pub struct NotifyTarget {
    /// Home-automation host, without scheme.
    pub host: String,
    /// Webhook id appended to `/api/webhook/`.
    pub token: SecretString,
}

/// Everything needed to set up one bridge connection.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub credentials: Credentials,
    pub notify: NotifyTarget,
    /// Number of channels queried by a full level query.
    pub channel_count: usize,
    /// Local hour (0-23) of the daily reconnect. `None` disables it.
    pub daily_reset_hour: Option<u32>,
    pub tls: TlsMode,
    pub timing: Timing,
}

impl BridgeConfig {
    /// Interpret the raw Setup arguments: channel count must be
    /// non-negative, reset hour is 0-23 or -1 for "never".
    pub fn from_setup(
        credentials: Credentials,
        notify: NotifyTarget,
        channel_count: i64,
        daily_reset_hour: i64,
    ) -> Result<Self, CoreError> {
        let channel_count = usize::try_from(channel_count).map_err(|_| CoreError::InvalidParams {
            field: "channelCount".into(),
            reason: format!("must be >= 0, got {channel_count}"),
        })?;

        Ok(Self {
            credentials,
            notify,
            channel_count,
            daily_reset_hour: reset_hour(daily_reset_hour)?,
            tls: TlsMode::default(),
            timing: Timing::default(),
        })
    }
}

/// Sentinel that disables the daily reconnect.
pub const RESET_DISABLED: i64 = -1;

/// Validate a reset hour: -1 disables, 0-23 schedules.
pub fn reset_hour(raw: i64) -> Result<Option<u32>, CoreError> {
    match raw {
        RESET_DISABLED => Ok(None),
        0..=23 => Ok(u32::try_from(raw).ok()),
        other => Err(CoreError::InvalidParams {
            field: "dailyResetHour".into(),
            reason: format!("expected 0-23 or -1, got {other}"),
        }),
    }
}
