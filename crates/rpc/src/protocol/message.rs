//! Call and reply envelopes.
//!
//! ```text
//! {"header" : {"xid" : 7, "msgType" : 0}, "cbody" : {"service" : "s", "method" : "m", "params" : [...]}}
//! {"header" : {"xid" : 7, "msgType" : 1}, "rbody" : {"replyStatus" : 0, "result" : ...}}
//! ```

use super::status::ReplyStatus;
use crate::codec::{self, Map, Value, encode_into, encode_str};
use crate::error::{ProtocolError, Result};
use std::fmt::Write;

/// `msgType` of a call.
pub const MSG_TYPE_CALL: i64 = 0;

/// `msgType` of a reply.
pub const MSG_TYPE_REPLY: i64 = 1;

/// One unit of exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Transaction id correlating a call with its reply.
    pub xid: u32,
    /// Kind-specific body.
    pub body: MessageBody,
}

/// A message is exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Client to server.
    Call(CallBody),
    /// Server to client.
    Reply(ReplyBody),
}

/// Body of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallBody {
    /// Target service.
    pub service: String,
    /// Target method.
    pub method: String,
    /// Call arguments. Usually a [`Value::Raw`] fragment already in wire form.
    pub params: Value,
}

/// Body of a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyBody {
    /// Outcome of the call.
    pub status: ReplyStatus,
    /// Result value. Only meaningful on success.
    pub result: Value,
}

impl Message {
    /// Build a call message.
    #[must_use]
    pub fn call(
        xid: u32,
        service: impl Into<String>,
        method: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            xid,
            body: MessageBody::Call(CallBody {
                service: service.into(),
                method: method.into(),
                params,
            }),
        }
    }

    /// Build a reply message.
    #[must_use]
    pub const fn reply(xid: u32, status: ReplyStatus, result: Value) -> Self {
        Self {
            xid,
            body: MessageBody::Reply(ReplyBody { status, result }),
        }
    }

    /// `msgType` for this message.
    #[must_use]
    pub const fn msg_type(&self) -> i64 {
        match self.body {
            MessageBody::Call(_) => MSG_TYPE_CALL,
            MessageBody::Reply(_) => MSG_TYPE_REPLY,
        }
    }

    /// Whether this is a reply.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        matches!(self.body, MessageBody::Reply(_))
    }
}

/// Encode a message into wire text.
#[must_use]
pub fn encode_message(msg: &Message) -> String {
    let mut out = String::with_capacity(128);
    let _ = write!(
        out,
        "{{\"header\" : {{\"xid\" : {}, \"msgType\" : {}}}, ",
        msg.xid,
        msg.msg_type()
    );
    match &msg.body {
        MessageBody::Call(call) => {
            out.push_str("\"cbody\" : {\"service\" : ");
            encode_str(&call.service, &mut out);
            out.push_str(", \"method\" : ");
            encode_str(&call.method, &mut out);
            out.push_str(", \"params\" : ");
            encode_into(&call.params, &mut out);
        }
        MessageBody::Reply(reply) => {
            let _ = write!(
                out,
                "\"rbody\" : {{\"replyStatus\" : {}, \"result\" : ",
                reply.status.code()
            );
            encode_into(&reply.result, &mut out);
        }
    }
    out.push_str("}}");
    out
}

/// Decode wire text into a message.
///
/// # Errors
///
/// Returns an error if the text is malformed or the envelope lacks a
/// required field.
pub fn decode_message(text: &str) -> Result<Message> {
    message_from_value(codec::decode(text)?)
}

/// Interpret an already decoded value as a message.
///
/// # Errors
///
/// Returns an error if the envelope lacks a required field.
pub fn message_from_value(value: Value) -> Result<Message> {
    let mut envelope = into_map(value, "message")?;

    let header = envelope
        .shift_remove("header")
        .ok_or(ProtocolError::MissingField("header"))?;
    let header = into_map(header, "header")?;

    let xid = header
        .get("xid")
        .ok_or(ProtocolError::MissingField("header.xid"))?
        .as_u32()
        .ok_or_else(|| invalid("header.xid", "expected an unsigned 32-bit integer"))?;

    let msg_type = header
        .get("msgType")
        .ok_or(ProtocolError::MissingField("header.msgType"))?
        .as_i64()
        .ok_or_else(|| invalid("header.msgType", "expected an integer"))?;

    let body = match msg_type {
        MSG_TYPE_CALL => {
            let mut cbody = into_map(
                envelope
                    .shift_remove("cbody")
                    .ok_or(ProtocolError::MissingField("cbody"))?,
                "cbody",
            )?;
            let service = take_string(&mut cbody, "service", "cbody.service")?;
            let method = take_string(&mut cbody, "method", "cbody.method")?;
            let params = cbody
                .shift_remove("params")
                .ok_or(ProtocolError::MissingField("cbody.params"))?;
            MessageBody::Call(CallBody {
                service,
                method,
                params,
            })
        }
        MSG_TYPE_REPLY => {
            let mut rbody = into_map(
                envelope
                    .shift_remove("rbody")
                    .ok_or(ProtocolError::MissingField("rbody"))?,
                "rbody",
            )?;
            let code = rbody
                .get("replyStatus")
                .ok_or(ProtocolError::MissingField("rbody.replyStatus"))?
                .as_i64()
                .ok_or_else(|| invalid("rbody.replyStatus", "expected an integer"))?;
            let result = rbody.shift_remove("result").unwrap_or_default();
            MessageBody::Reply(ReplyBody {
                status: ReplyStatus::from_code(code),
                result,
            })
        }
        other => return Err(ProtocolError::UnknownMessageType(other).into()),
    };

    Ok(Message { xid, body })
}

fn into_map(value: Value, field: &'static str) -> Result<Map> {
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(invalid(field, "expected an object").into()),
    }
}

fn take_string(map: &mut Map, key: &str, field: &'static str) -> Result<String> {
    match map.shift_remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(invalid(field, "expected a string").into()),
        None => Err(ProtocolError::MissingField(field).into()),
    }
}

fn invalid(field: &'static str, reason: &str) -> ProtocolError {
    ProtocolError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}
