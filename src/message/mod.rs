//! Message contract.
//!
//! A message is the typed unit of work a caller hands to the bridge. It
//! serialises to the `msg` payload of an envelope, names its routing type,
//! checks itself before anything is sent, and declares the type its answer
//! decodes into.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::Result;
use crate::validation::validate_non_empty;

/// A request that can cross a context boundary.
///
/// `validate` runs exactly once per call, at envelope construction, before
/// any transport or channel is touched.
pub trait Message: Serialize + Send + Sync {
    /// Type the callee's `return` value decodes into.
    type Response: DeserializeOwned + Send;

    /// Routing discriminator carried as the envelope `type`.
    fn msg_type(&self) -> &str;

    /// Self-check. Fails with `Error::Validation`.
    fn validate(&self) -> Result<()>;
}

/// Untyped message: an explicit routing type plus an opaque JSON payload.
///
/// Serialises as the payload alone. Useful when the message set is only known
/// at runtime (the demo binary, tests).
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub msg_type: String,
    pub payload: Value,
}

impl RawMessage {
    pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload,
        }
    }
}

impl Serialize for RawMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

impl Message for RawMessage {
    type Response = Value;

    fn msg_type(&self) -> &str {
        &self.msg_type
    }

    fn validate(&self) -> Result<()> {
        validate_non_empty(&self.msg_type, "message type")
    }
}

/// Decode a resolved `return` value into the message's declared response type.
pub fn decode_response<R: DeserializeOwned>(value: Value) -> Result<R> {
    Ok(serde_json::from_value(value)?)
}
