//! Wire shapes.
//!
//! - **Envelope**: what the native transport receives (`{port, type, msg}`)
//! - **CallResult**: what comes back (`{return?, error?}`)
//! - **ChannelEvent**: what travels over the shared event channel, either a
//!   proxied request (`proxy-message`) or its answer (`proxy-message-result`)
//!
//! Field names are fixed by the peers on the other side of the boundary, so
//! every struct here pins its serde names explicitly.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::message::Message;
use crate::types::{CorrelationId, Error, Result};
use crate::validation::{validate_non_empty, validate_port};

/// Request handed to the native transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Logical channel name on the receiving side.
    pub port: String,

    /// Message type tag used for routing.
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Serialised message payload.
    pub msg: Value,
}

impl Envelope {
    /// Validate `msg` and wrap it for `port`.
    ///
    /// This is the only place a message is validated; nothing reaches a
    /// transport or channel without passing through here first.
    pub fn from_message<M: Message + ?Sized>(port: &str, msg: &M) -> Result<Self> {
        validate_port(port)?;
        msg.validate()?;
        let msg_type = msg.msg_type().to_string();
        validate_non_empty(&msg_type, "message type")?;

        Ok(Self {
            port: port.to_string(),
            msg_type,
            msg: serde_json::to_value(msg)?,
        })
    }

    /// Rebuild an envelope from relayed parts. No validation: the sender
    /// already validated the message.
    pub fn relayed(port: String, msg_type: String, msg: Value) -> Self {
        Self {
            port,
            msg_type,
            msg,
        }
    }
}

/// Outcome of a remote call as carried on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Success value. `Some(Value::Null)` is a present null, not an absence.
    #[serde(
        rename = "return",
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,

    /// Error string produced by the callee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl CallResult {
    pub fn ok(value: Value) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            value: None,
            error: Some(message.into()),
        }
    }

    /// Interpret a raw transport reply.
    ///
    /// Nothing or `null` is an absent result. Anything else is read as a
    /// `CallResult`; a reply that is not shaped like one carries neither
    /// field and settles as empty.
    pub fn from_reply(reply: Option<Value>) -> Option<Self> {
        match reply {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value::<CallResult>(raw) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!("Reply is not a call result, treating as empty: {}", e);
                    Some(Self::default())
                }
            },
        }
    }

    /// Settle a possibly absent result into the caller-facing outcome.
    ///
    /// A non-empty error wins over a value; absence of both is `EmptyResult`.
    pub fn settle(result: Option<Self>) -> Result<Value> {
        let result = result.ok_or(Error::EmptyResult)?;
        if let Some(error) = result.error.filter(|e| !e.is_empty()) {
            return Err(Error::Application(error));
        }
        result.value.ok_or(Error::EmptyResult)
    }
}

/// Proxied request published on the event channel.
///
/// Decoding is lenient: a `proxy-message` missing fields still decodes, so
/// the relay can tell a malformed request apart from traffic that is not for
/// it at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyEnvelope {
    #[serde(rename = "msgType", default)]
    pub msg_type: String,

    /// Correlation id as sent. Anything but a non-empty string is a
    /// protocol violation, so the raw value is kept for the relay to judge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Value>,

    #[serde(default)]
    pub port: String,

    #[serde(default)]
    pub msg: Value,
}

impl ProxyEnvelope {
    pub fn new(envelope: Envelope, id: &CorrelationId) -> Self {
        Self {
            msg_type: envelope.msg_type,
            index: Some(Value::String(id.to_string())),
            port: envelope.port,
            msg: envelope.msg,
        }
    }

    /// Correlation id, if one was sent.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.index
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|index| CorrelationId::from_string(index).ok())
    }

    /// The envelope the relay hands to its own transport. The routing type is
    /// the proxied `msgType`, not anything derived from the payload.
    pub fn into_envelope(self) -> Envelope {
        Envelope::relayed(self.port, self.msg_type, self.msg)
    }
}

/// Answer to a proxied request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResult {
    #[serde(default)]
    pub index: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CallResult>,
}

impl ProxyResult {
    pub fn new(id: &CorrelationId, result: Option<CallResult>) -> Self {
        Self {
            index: id.to_string(),
            result,
        }
    }
}

/// Everything the bridge puts on, or picks off, the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelEvent {
    #[serde(rename = "proxy-message")]
    ProxyMessage(ProxyEnvelope),

    #[serde(rename = "proxy-message-result")]
    ProxyMessageResult(ProxyResult),
}

impl ChannelEvent {
    /// Decode a raw channel event. `None` means "not for me".
    pub fn decode(event: &Value) -> Option<Self> {
        Self::deserialize(event).ok()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
