//! JSON-RPC 2.0 control surface over HTTP.
//!
//! One endpoint, `POST /`, taking positional parameters. Method names
//! may carry the `LampServerHandler.` namespace used by existing
//! home-automation integrations.

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use lamp_core::{BridgeConfig, CoreError, Credentials, NotifyTarget};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;

pub const JSONRPC_VERSION: &str = "2.0";
const NAMESPACE: &str = "LampServerHandler.";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<CoreError> for RpcError {
    fn from(err: CoreError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// ── Methods ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Setup,
    Connect,
    Reconnect,
    Disconnect,
    SetScene,
    SetChannelLevel,
    QueryChannelLevels,
}

impl FromStr for Method {
    type Err = RpcError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let bare = name.strip_prefix(NAMESPACE).unwrap_or(name);
        match bare {
            "Setup" => Ok(Self::Setup),
            "Connect" => Ok(Self::Connect),
            "Reconnect" => Ok(Self::Reconnect),
            "Disconnect" => Ok(Self::Disconnect),
            "SetScene" => Ok(Self::SetScene),
            "SetChannelLevel" => Ok(Self::SetChannelLevel),
            "QueryChannelLevels" => Ok(Self::QueryChannelLevels),
            _ => Err(RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("method not found: {name}"),
            }),
        }
    }
}

// ── Positional parameters ───────────────────────────────────────────

/// Positional arguments of one call.
#[derive(Debug)]
pub struct Params(Vec<Value>);

impl Params {
    pub fn from_value(params: Value) -> Result<Self, CoreError> {
        match params {
            Value::Null => Ok(Self(Vec::new())),
            Value::Array(items) => Ok(Self(items)),
            other => Err(CoreError::InvalidParams {
                field: "params".into(),
                reason: format!("expected a positional array, got {other}"),
            }),
        }
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn expect_len(&self, names: &[&str]) -> Result<(), CoreError> {
        if self.len() == names.len() {
            return Ok(());
        }
        Err(CoreError::InvalidParams {
            field: "params".into(),
            reason: format!(
                "expected {} argument(s) ({}), got {}",
                names.len(),
                names.join(", "),
                self.len()
            ),
        })
    }

    fn int(&self, index: usize, name: &str) -> Result<i64, CoreError> {
        self.0
            .get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| CoreError::InvalidParams {
                field: name.into(),
                reason: "expected an integer".into(),
            })
    }

    fn string(&self, index: usize, name: &str) -> Result<String, CoreError> {
        self.0
            .get(index)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| CoreError::InvalidParams {
                field: name.into(),
                reason: "expected a string".into(),
            })
    }
}

const SETUP_PARAMS: [&str; 7] = [
    "username",
    "password",
    "host",
    "notifyHost",
    "notifyToken",
    "channelCount",
    "dailyResetHour",
];
const CONNECT_PARAMS: [&str; 3] = ["host", "username", "password"];

fn setup_config(bridge: &Bridge, params: &Params) -> Result<BridgeConfig, CoreError> {
    params.expect_len(&SETUP_PARAMS)?;
    let credentials = Credentials {
        username: params.string(0, "username")?,
        password: SecretString::from(params.string(1, "password")?),
        host: params.string(2, "host")?,
    };
    let notify = NotifyTarget {
        host: params.string(3, "notifyHost")?,
        token: SecretString::from(params.string(4, "notifyToken")?),
    };
    let config = BridgeConfig::from_setup(
        credentials,
        notify,
        params.int(5, "channelCount")?,
        params.int(6, "dailyResetHour")?,
    )?;
    Ok(bridge.with_defaults(config))
}

fn ok() -> Value {
    Value::String("ok".into())
}

/// Run one call against the bridge.
pub async fn dispatch(bridge: &Bridge, method: Method, params: &Params) -> Result<Value, CoreError> {
    match method {
        Method::Setup => {
            let config = setup_config(bridge, params)?;
            bridge.setup(config).await?;
            Ok(ok())
        }
        Method::Connect => {
            let credentials = if params.is_empty() {
                None
            } else {
                params.expect_len(&CONNECT_PARAMS)?;
                Some(Credentials {
                    host: params.string(0, "host")?,
                    username: params.string(1, "username")?,
                    password: SecretString::from(params.string(2, "password")?),
                })
            };
            bridge.connect(credentials).await?;
            Ok(ok())
        }
        Method::Reconnect => {
            params.expect_len(&[])?;
            bridge.connection().await?.reconnect().await?;
            Ok(ok())
        }
        Method::Disconnect => {
            params.expect_len(&[])?;
            bridge.connection().await?.disconnect().await?;
            warn!("gateway disconnected on request");
            Ok(ok())
        }
        Method::SetScene => {
            params.expect_len(&["sceneId", "transitionTicks"])?;
            let scene = params.int(0, "sceneId")?;
            let transition = params.int(1, "transitionTicks")?;
            bridge
                .connection()
                .await?
                .set_scene(scene, transition)
                .await?;
            info!(scene, transition, "scene set");
            Ok(ok())
        }
        Method::SetChannelLevel => {
            params.expect_len(&["channel", "percent"])?;
            let channel = params.int(0, "channel")?;
            let percent = params.int(1, "percent")?;
            bridge
                .connection()
                .await?
                .set_channel_level(channel, percent)
                .await?;
            info!(channel, percent, "channel level set");
            Ok(ok())
        }
        Method::QueryChannelLevels => {
            params.expect_len(&[])?;
            let levels = bridge.connection().await?.query_channel_levels().await?;
            Ok(Value::from(levels))
        }
    }
}

// ── HTTP endpoint ───────────────────────────────────────────────────

pub fn router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

async fn rpc_handler(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Response {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let code = if e.is_syntax() || e.is_eof() {
                PARSE_ERROR
            } else {
                INVALID_REQUEST
            };
            return Json(RpcResponse::failure(
                Value::Null,
                RpcError {
                    code,
                    message: e.to_string(),
                },
            ))
            .into_response();
        }
    };

    if request.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
        debug!(version = ?request.jsonrpc, "non-2.0 JSON-RPC request accepted");
    }

    let outcome = match request.method.parse::<Method>() {
        Ok(method) => {
            debug!(method = ?method, "rpc call");
            let result = match Params::from_value(request.params) {
                Ok(params) => dispatch(&bridge, method, &params).await,
                Err(e) => Err(e),
            };
            result.map_err(|e| {
                warn!(method = ?method, code = e.code(), error = %e, "rpc call failed");
                RpcError::from(e)
            })
        }
        Err(e) => Err(e),
    };

    let Some(id) = request.id else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let response = match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    };
    Json(response).into_response()
}
