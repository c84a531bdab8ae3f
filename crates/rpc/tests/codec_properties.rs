//! Property tests for the value codec and the stream framer.

use bytes::BytesMut;
use callwire_rpc::protocol::{
    Message, ReplyStatus, ScanResult, decode_message, encode_message, scan,
};
use callwire_rpc::{JsonFrameCodec, Map, Value, decode, encode};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::Float),
        any::<String>().prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::vec((any::<String>(), inner), 0..8)
                .prop_map(|entries| Value::Map(entries.into_iter().collect::<Map>())),
        ]
    })
}

fn arb_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        (any::<u32>(), "[A-Za-z]{1,12}", "[A-Za-z]{1,12}", arb_value())
            .prop_map(|(xid, service, method, params)| Message::call(xid, service, method, params)),
        (any::<u32>(), arb_value())
            .prop_map(|(xid, result)| Message::reply(xid, ReplyStatus::Success, result)),
    ]
}

proptest! {
    #[test]
    fn decode_inverts_encode(value in arb_value()) {
        let text = encode(&value);
        prop_assert_eq!(decode(&text).unwrap(), value);
    }

    #[test]
    fn encoded_text_is_ascii(value in arb_value()) {
        prop_assert!(encode(&value).is_ascii());
    }

    #[test]
    fn messages_survive_the_envelope(msg in arb_message()) {
        let text = encode_message(&msg);
        prop_assert_eq!(decode_message(&text).unwrap(), msg);
    }

    #[test]
    fn every_proper_prefix_is_incomplete(msg in arb_message()) {
        let text = encode_message(&msg);
        let bytes = text.as_bytes();
        for k in 1..bytes.len() {
            prop_assert_eq!(scan(&bytes[..k]), ScanResult::Incomplete, "prefix of {}", k);
        }
        prop_assert_eq!(scan(bytes), ScanResult::Complete(bytes.len()));
    }

    #[test]
    fn framer_recovers_messages_at_any_split(
        msgs in prop::collection::vec(arb_message(), 1..5),
        split in any::<prop::sample::Index>(),
    ) {
        let texts: Vec<String> = msgs.iter().map(encode_message).collect();
        let stream = texts.concat().into_bytes();
        let at = split.index(stream.len() + 1);

        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for chunk in [&stream[..at], &stream[at..]] {
            buf.extend_from_slice(chunk);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                frames.push(String::from_utf8(frame.to_vec()).unwrap());
            }
        }

        prop_assert!(buf.is_empty());
        prop_assert_eq!(frames, texts);
    }

    #[test]
    fn decode_never_panics(text in any::<String>()) {
        let _ = decode(&text);
    }
}
