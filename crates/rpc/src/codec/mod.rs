//! JSON text codec.
//!
//! Decoding goes through `serde_json`. Encoding is written out here since
//! the wire format fixes the escaping of non-ASCII text as `\uXXXX`, the
//! separator spacing and the verbatim splicing of pre-encoded fragments
//! ([`Value::Raw`]). Typed callers can go through serde with [`to_value`]
//! and [`from_value`].

mod decode;
mod encode;
mod value;

pub use decode::{decode, decode_slice};
pub use encode::{encode, encode_into, encode_str};
pub use value::{Map, Value};

use crate::error::{CodecError, Result};
use serde::{Serialize, de::DeserializeOwned};

/// Identifier of the codec negotiated during the stream handshake and
/// announced on request/response transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecId {
    /// Binary codec. Recognised on the wire but not implemented here.
    Binary = 1,
    /// JSON text codec.
    Json = 2,
}

impl CodecId {
    /// Wire byte for this codec.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CodecId {
    type Error = CodecError;

    fn try_from(value: u8) -> std::result::Result<Self, CodecError> {
        match value {
            1 => Ok(Self::Binary),
            2 => Ok(Self::Json),
            other => Err(CodecError::UnsupportedCodec(other)),
        }
    }
}

/// Types that know how to write themselves in wire form.
///
/// This is the escape hatch for custom objects: whatever
/// [`ToWire::to_wire`] returns is spliced into the message verbatim.
pub trait ToWire {
    /// Wire text for this value.
    fn to_wire(&self) -> String;

    /// Wrap the wire text as a [`Value::Raw`] fragment.
    fn to_raw_value(&self) -> Value {
        Value::Raw(self.to_wire())
    }
}

impl ToWire for Value {
    fn to_wire(&self) -> String {
        encode(self)
    }
}

/// Convert any serializable value into a [`Value`].
///
/// # Errors
///
/// Returns an error if the value cannot be represented (for example maps
/// with non-string keys).
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map(Value::from)
        .map_err(|e| CodecError::SerializationFailed(e.to_string()).into())
}

/// Convert a [`Value`] into any deserializable type.
///
/// Raw fragments are decoded first, so results that carry pre-encoded
/// sub-trees convert like any other value.
///
/// # Errors
///
/// Returns an error if a raw fragment is malformed or the shape does not
/// match `T`.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    let json = into_json(value)?;
    serde_json::from_value(json).map_err(|e| CodecError::DeserializationFailed(e.to_string()).into())
}

fn into_json(value: Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Int(i) => serde_json::Value::from(i),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s),
        Value::Array(items) => serde_json::Value::Array(
            items.into_iter().map(into_json).collect::<Result<_>>()?,
        ),
        Value::Map(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| into_json(v).map(|v| (k, v)))
                .collect::<Result<_>>()?,
        ),
        Value::Raw(fragment) => into_json(decode(&fragment).map_err(CodecError::from)?)?,
    })
}
