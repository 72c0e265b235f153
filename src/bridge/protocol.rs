//! Wire protocol shared by the host and peer bridges.
//!
//! Every payload is a JSON-encoded [`Envelope`]. Requests and notifications
//! carry a `method`; responses carry the numeric `id` of the request they
//! answer plus `result` or `error`. Host-originated notifications use a
//! string `id` naming the event instead of a `method`.
//!
//! # Examples
//!
//! ```json
//! {"method": "valueUpdated", "params": ["ns/fps", 60, 90, "tablet"], "ns": "ns", "uuid": "…"}
//! {"method": "Settings.getValue", "params": ["ns/fps", 90], "id": 3, "ns": "ns", "uuid": "…"}
//! {"id": 3, "result": 60, "ns": "ns", "uuid": "…"}
//! {"id": "valueUpdated", "params": ["ns/fps", 60, 90, "Settings"], "ns": "ns", "uuid": "…"}
//! ```
//!
//! [`decode`] turns an envelope addressed to this session into a [`Message`];
//! anything else is dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::Result;
use crate::signal::ValueChange;

pub const METHOD_VALUE_UPDATED: &str = "valueUpdated";
pub const METHOD_GET_VALUE: &str = "Settings.getValue";
pub const METHOD_SET_VALUE: &str = "Settings.setValue";
pub const METHOD_READY: &str = "ready";
/// Host notification carrying host-provided parameters for the peer.
pub const EVENT_EXTRA_PARAMS: &str = "extraParams";

/// Correlation id for a request that expects a response.
pub type RequestId = u64;

/// The serialized message structure exchanged over the channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub ns: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fields this crate does not interpret, kept for unhandled-message hooks.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    fn addressed(ns: &str, uuid: &str) -> Self {
        Self {
            ns: ns.to_string(),
            uuid: uuid.to_string(),
            ..Self::default()
        }
    }

    /// A method call; `id` is set when the sender expects a response.
    pub fn request(
        ns: &str,
        uuid: &str,
        method: &str,
        params: Vec<Value>,
        id: Option<RequestId>,
    ) -> Self {
        Self {
            id: id.map(Value::from),
            method: Some(method.to_string()),
            params: Some(Value::Array(params)),
            ..Self::addressed(ns, uuid)
        }
    }

    /// A host-side event notification, identified by a string `id`.
    pub fn event(ns: &str, uuid: &str, event: &str, params: Vec<Value>) -> Self {
        Self {
            id: Some(Value::from(event)),
            params: Some(Value::Array(params)),
            ..Self::addressed(ns, uuid)
        }
    }

    /// A response to request `id`.
    pub fn response(
        ns: &str,
        uuid: &str,
        id: Value,
        result: std::result::Result<Value, String>,
    ) -> Self {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            id: Some(id),
            result,
            error,
            ..Self::addressed(ns, uuid)
        }
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// The `i`th positional parameter, `Null` if absent.
    pub fn param(&self, i: usize) -> Value {
        match &self.params {
            Some(Value::Array(items)) => items.get(i).cloned().unwrap_or(Value::Null),
            Some(other) if i == 0 => other.clone(),
            _ => Value::Null,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A validated, classified message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// The other side changed a value: `[key, value, old_value, origin]`.
    ValueUpdated(ValueChange),

    /// `Settings.getValue` request: `[key, default?]`.
    GetValue {
        id: Option<Value>,
        key: Value,
        default: Option<Value>,
    },

    /// `Settings.setValue` request: `[key, value]`.
    SetValue {
        id: Option<Value>,
        key: Value,
        value: Value,
    },

    /// Peer finished loading and wants the session parameters.
    Ready,

    /// Host-provided parameters for the peer.
    ExtraParams(Value),

    /// Response to one of our requests.
    Response {
        id: RequestId,
        result: std::result::Result<Value, String>,
    },

    /// Anything else addressed to this session.
    Unhandled(Envelope),
}

/// Parse `text` and classify it if it is addressed to `(ns, uuid)`.
///
/// Malformed payloads and envelopes for other sessions return `None`.
pub fn decode(text: &str, ns: &str, uuid: &str) -> Option<Message> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            trace!("dropping unparsable message: {}", e);
            return None;
        }
    };
    if envelope.ns != ns || envelope.uuid != uuid {
        trace!(ns = %envelope.ns, uuid = %envelope.uuid, "dropping message for another session");
        return None;
    }
    classify(envelope)
}

fn classify(envelope: Envelope) -> Option<Message> {
    if let Some(method) = envelope.method.clone() {
        return Some(match method.as_str() {
            METHOD_VALUE_UPDATED => Message::ValueUpdated(value_change(&envelope)?),
            METHOD_GET_VALUE => Message::GetValue {
                key: envelope.param(0),
                default: Some(envelope.param(1)).filter(|v| !v.is_null()),
                id: envelope.id,
            },
            METHOD_SET_VALUE => Message::SetValue {
                key: envelope.param(0),
                value: envelope.param(1),
                id: envelope.id,
            },
            METHOD_READY => Message::Ready,
            _ => Message::Unhandled(envelope),
        });
    }

    match envelope.id.clone() {
        Some(Value::String(event)) if event == METHOD_VALUE_UPDATED => {
            Some(Message::ValueUpdated(value_change(&envelope)?))
        }
        Some(Value::String(event)) if event == EVENT_EXTRA_PARAMS => {
            Some(Message::ExtraParams(envelope.param(0)))
        }
        Some(Value::Number(n)) => match n.as_u64() {
            Some(id) => {
                let result = match envelope.error {
                    Some(error) => Err(error),
                    None => Ok(envelope.result.unwrap_or(Value::Null)),
                };
                Some(Message::Response { id, result })
            }
            None => Some(Message::Unhandled(envelope)),
        },
        _ => Some(Message::Unhandled(envelope)),
    }
}

fn value_change(envelope: &Envelope) -> Option<ValueChange> {
    let Value::String(key) = envelope.param(0) else {
        trace!("dropping valueUpdated without a string key");
        return None;
    };
    let origin = match envelope.param(3) {
        Value::String(origin) => origin,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Some(ValueChange::new(
        key,
        envelope.param(1),
        envelope.param(2),
        origin,
    ))
}
