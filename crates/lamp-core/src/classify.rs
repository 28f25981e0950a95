//! Inbound frame classification.
//!
//! Every frame is decoded into a minimal envelope (`method`, `params`)
//! first and then matched against a closed set of known tags. Anything
//! that does not fit becomes [`Frame::Unrecognized`] with a reason; the
//! classifier never fails and never panics.

use lamp_api::protocol::{
    AlertParams, CHANNEL_LEVEL_ANSWER_ID, InboundEnvelope, LEVEL_ANSWER_INDEX,
    METHOD_ATTRIBUTE_CHANGE_ALERT, METHOD_MESSAGE_ALERT, SCENE_ECHO_INDEX, SCENE_SET_ID,
};
use serde_json::Value;

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `AttributeChangeAlert`: something changed physically.
    Notification { scene_related: bool },
    /// `MessageAlert`: the gateway's late answer to something we sent.
    Answer(Answer),
    /// Malformed or unknown; logged and skipped.
    Unrecognized { reason: String },
}

/// Known answer kinds, keyed by `params.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Id 994: current brightness of the queried channel.
    ChannelLevel { level: i64 },
    /// Id 1001: echo of a scene-set command.
    SceneSet { scene: i64 },
    /// Any other sub-identifier.
    Other { id: i64 },
}

/// Classify one raw text frame.
pub fn classify(raw: &str) -> Frame {
    let envelope: InboundEnvelope = match serde_json::from_str(raw) {
        Ok(env) => env,
        Err(e) => {
            return Frame::Unrecognized {
                reason: format!("invalid JSON: {e}"),
            };
        }
    };

    match envelope.method.as_deref() {
        Some(METHOD_ATTRIBUTE_CHANGE_ALERT) => Frame::Notification {
            scene_related: envelope.params.as_ref().is_some_and(mentions_scene),
        },
        Some(METHOD_MESSAGE_ALERT) => classify_answer(envelope.params),
        Some(other) => Frame::Unrecognized {
            reason: format!("unknown method {other:?}"),
        },
        None => Frame::Unrecognized {
            reason: "frame has no method".into(),
        },
    }
}

fn classify_answer(params: Option<Value>) -> Frame {
    let Some(params) = params else {
        return Frame::Unrecognized {
            reason: "MessageAlert without params".into(),
        };
    };
    let params: AlertParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return Frame::Unrecognized {
                reason: format!("MessageAlert params: {e}"),
            };
        }
    };

    let answer = match params.id {
        CHANNEL_LEVEL_ANSWER_ID => match params.data.get(LEVEL_ANSWER_INDEX) {
            Some(&level) => Answer::ChannelLevel { level },
            None => return short_payload(params.id, params.data.len()),
        },
        SCENE_SET_ID => match params.data.get(SCENE_ECHO_INDEX) {
            Some(&scene) => Answer::SceneSet { scene },
            None => return short_payload(params.id, params.data.len()),
        },
        id => Answer::Other { id },
    };
    Frame::Answer(answer)
}

fn short_payload(id: i64, len: usize) -> Frame {
    Frame::Unrecognized {
        reason: format!("answer {id} carries only {len} data values"),
    }
}

/// Whether a notification's params describe a scene change: either the
/// scene sub-identifier or a key / string value naming a scene.
fn mentions_scene(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(key, v)| {
            key.to_ascii_lowercase().contains("scene")
                || (key == "id" && v.as_i64() == Some(SCENE_SET_ID))
                || mentions_scene(v)
        }),
        Value::Array(items) => items.iter().any(mentions_scene),
        Value::String(s) => s.to_ascii_lowercase().contains("scene"),
        _ => false,
    }
}
