//! Gateway JSON-RPC frame shapes.
//!
//! Outbound frames are plain JSON-RPC 2.0 requests with a fresh UUID `id`.
//! The gateway never echoes that id back: answers arrive as `MessageAlert`
//! pushes carrying a numeric `params.id` sub-identifier instead, and state
//! changes arrive as `AttributeChangeAlert` pushes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

pub const JSONRPC_VERSION: &str = "2.0";

// ── Method names ─────────────────────────────────────────────────────

pub const METHOD_LOGIN: &str = "LogIn";
pub const METHOD_MONITOR: &str = "Monitor";
pub const METHOD_TRANSMIT: &str = "Transmit";
pub const METHOD_ATTRIBUTE_CHANGE_ALERT: &str = "AttributeChangeAlert";
pub const METHOD_MESSAGE_ALERT: &str = "MessageAlert";

// ── Sub-identifiers (`params.id`) ────────────────────────────────────

/// Outbound channel set / channel query.
pub const CHANNEL_SET_ID: i64 = 1000;
/// Outbound scene set, and the gateway's echo of it.
pub const SCENE_SET_ID: i64 = 1001;
/// Inbound answer to a channel level query.
pub const CHANNEL_LEVEL_ANSWER_ID: i64 = 994;

/// Opcode in slot 4 of a channel frame that asks for the current level.
const QUERY_LEVEL_OPCODE: i64 = 18;

/// Index of the brightness value inside a channel level answer.
pub const LEVEL_ANSWER_INDEX: usize = 5;
/// Index of the scene number inside a scene-set echo.
pub const SCENE_ECHO_INDEX: usize = 3;

// ── Outbound ─────────────────────────────────────────────────────────

/// A JSON-RPC 2.0 request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<P> {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: P,
}

impl<P: Serialize> Request<P> {
    pub fn new(method: &str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            params,
        }
    }

    /// Serialize to the text payload of a WebSocket frame.
    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorParams {
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(rename = "type")]
    pub kind: String,
}

impl MonitorParams {
    /// Subscribe to every attribute change the gateway reports.
    pub fn all() -> Self {
        Self {
            predicate: Predicate {
                kind: "True".into(),
            },
        }
    }
}

/// Payload of a `Transmit` frame: a sub-identifier plus an opcode array
/// whose positions are gateway specific.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitParams {
    pub id: i64,
    pub data: Vec<i64>,
}

impl TransmitParams {
    pub fn set_scene(scene: i64, transition_ticks: i64) -> Self {
        Self {
            id: SCENE_SET_ID,
            data: vec![0, 1, 1, scene, transition_ticks],
        }
    }

    pub fn set_channel_level(channel: i64, percent: i64) -> Self {
        Self {
            id: CHANNEL_SET_ID,
            data: vec![0, 1, 0, channel, 1, percent, 0],
        }
    }

    pub fn query_channel_level(channel: i64) -> Self {
        Self {
            id: CHANNEL_SET_ID,
            data: vec![0, 1, 0, channel, QUERY_LEVEL_OPCODE],
        }
    }

    /// Returns the queried channel if this is a level query frame.
    pub fn queried_channel(&self) -> Option<i64> {
        match self.data.as_slice() {
            [0, 1, 0, channel, QUERY_LEVEL_OPCODE] if self.id == CHANNEL_SET_ID => Some(*channel),
            _ => None,
        }
    }
}

pub type LoginRequest = Request<LoginParams>;
pub type MonitorRequest = Request<MonitorParams>;
pub type TransmitRequest = Request<TransmitParams>;

pub fn transmit(params: TransmitParams) -> TransmitRequest {
    Request::new(METHOD_TRANSMIT, params)
}

// ── Inbound ──────────────────────────────────────────────────────────

/// Minimal envelope every inbound frame is decoded into before
/// classification. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// `params` of a `MessageAlert` push.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertParams {
    pub id: i64,
    #[serde(default)]
    pub data: Vec<i64>,
}
