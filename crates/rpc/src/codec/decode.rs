//! Wire text back into [`Value`] trees.
//!
//! Parsing is done by `serde_json`; nothing in the input is ever evaluated.
//! Objects keep their member order (`preserve_order`) and floats parse
//! exactly (`float_roundtrip`), so decoding inverts [`super::encode`].
//! Nesting is bounded by `serde_json`'s recursion limit.

use super::value::Value;
use crate::error::DecodeError;

/// Decode wire text into a value.
///
/// # Errors
///
/// Returns a [`DecodeError`] with the line and column of the first
/// offending character when the text is not a single well-formed value.
pub fn decode(text: &str) -> Result<Value, DecodeError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Ok(Value::from(json))
}

/// Decode wire bytes, rejecting input that is not UTF-8.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_slice(bytes: &[u8]) -> Result<Value, DecodeError> {
    let json: serde_json::Value = serde_json::from_slice(bytes)?;
    Ok(Value::from(json))
}
