//! Message framing for the stream transport.
//!
//! Messages carry no length prefix. Boundaries are recovered by scanning
//! for the end of the top-level object, tracking nesting and string
//! literals only.

use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (10MB by default).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Result of scanning a buffer for one complete message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    /// The buffer does not start with `{`.
    Invalid,
    /// More bytes are needed.
    Incomplete,
    /// The first message ends after this many bytes.
    Complete(usize),
}

/// Find the length of the first complete object at the start of `buf`.
///
/// The scan is stateless; call it again from the start after appending
/// more bytes.
#[must_use]
pub fn scan(buf: &[u8]) -> ScanResult {
    match buf.first() {
        None => return ScanResult::Incomplete,
        Some(b'{') => {}
        Some(_) => return ScanResult::Invalid,
    }

    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in buf.iter().enumerate().skip(1) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return ScanResult::Complete(i + 1);
                }
            }
            b'"' => in_string = true,
            _ => {}
        }
    }

    ScanResult::Incomplete
}

/// Codec that splits a byte stream into whole messages.
///
/// Each decoded item is the raw text of one top-level object. Encoding
/// writes already-encoded messages verbatim.
#[derive(Debug, Clone)]
pub struct JsonFrameCodec {
    max_frame_size: usize,
}

impl JsonFrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with custom max frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Configured maximum frame size.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for JsonFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonFrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match scan(buf) {
            ScanResult::Complete(len) => {
                if len > self.max_frame_size {
                    return Err(too_large(len, self.max_frame_size));
                }
                Ok(Some(buf.split_to(len).freeze()))
            }
            ScanResult::Incomplete => {
                if buf.len() > self.max_frame_size {
                    return Err(too_large(buf.len(), self.max_frame_size));
                }
                Ok(None)
            }
            ScanResult::Invalid => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                ProtocolError::InvalidFrame(format!(
                    "message must start with '{{', got byte {:#04x}",
                    buf[0]
                )),
            )),
        }
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for JsonFrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: T, buf: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let bytes = item.as_ref();
        if bytes.len() > self.max_frame_size {
            return Err(too_large(bytes.len(), self.max_frame_size));
        }
        buf.reserve(bytes.len());
        buf.put_slice(bytes);
        Ok(())
    }
}

fn too_large(size: usize, max: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        ProtocolError::FrameTooLarge { size, max },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_complete() {
        let text = br#"{"a" : [1, {"b" : 2}]}"#;
        assert_eq!(scan(text), ScanResult::Complete(text.len()));
    }

    #[test]
    fn test_scan_stops_at_first_message() {
        assert_eq!(scan(b"{}{\"x\" : 1}"), ScanResult::Complete(2));
    }

    #[test]
    fn test_scan_ignores_brackets_in_strings() {
        let text = br#"{"s" : "}]\"{"}"#;
        assert_eq!(scan(text), ScanResult::Complete(text.len()));
        assert_eq!(scan(br#"{"s" : "}"#), ScanResult::Incomplete);
    }

    #[test]
    fn test_scan_escaped_backslash_before_quote() {
        let text = br#"{"s" : "a\\"}"#;
        assert_eq!(scan(text), ScanResult::Complete(text.len()));
    }

    #[test]
    fn test_scan_incomplete_and_invalid() {
        assert_eq!(scan(b""), ScanResult::Incomplete);
        assert_eq!(scan(b"{\"a\" : [1, 2"), ScanResult::Incomplete);
        assert_eq!(scan(b" {}"), ScanResult::Invalid);
        assert_eq!(scan(b"[1]"), ScanResult::Invalid);
    }

    #[test]
    fn test_scan_single_quotes_are_not_delimiters() {
        assert_eq!(scan(b"{'a':'3', 'b':'7'}{'c"), ScanResult::Complete(18));
        assert_eq!(scan(b"{'a':'3', 'b':"), ScanResult::Incomplete);
    }

    #[test]
    fn test_scan_rejects_non_object_start() {
        assert_eq!(scan(b"kjh23@lj2rfO@#$2"), ScanResult::Invalid);
    }

    #[test]
    fn test_decoder_yields_messages_in_order() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"n\" : 1}{\"n\" : 2}{\"n\""[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"{\"n\" : 1}"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"{\"n\" : 2}"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b" : 3}");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"{\"n\" : 3}"[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b"hello"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_decoder_enforces_max_frame_size() {
        let mut codec = JsonFrameCodec::new().with_max_frame_size(8);
        let mut buf = BytesMut::from(&b"{\"long\" : \"unterminated"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encoder_is_verbatim() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("{\"a\" : 1}", &mut buf).unwrap();
        assert_eq!(&buf[..], b"{\"a\" : 1}");
    }
}
