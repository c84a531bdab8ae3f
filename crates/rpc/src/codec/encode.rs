//! Text encoder for [`Value`] trees.

use super::value::Value;
use std::fmt::Write;

/// Encode a value into wire text.
#[must_use]
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    encode_into(value, &mut out);
    out
}

/// Encode a value, appending to `out`.
pub fn encode_into(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(f) => encode_float(*f, out),
        Value::String(s) => encode_str(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                encode_into(item, out);
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                encode_str(key, out);
                out.push_str(" : ");
                encode_into(item, out);
            }
            out.push('}');
        }
        Value::Raw(fragment) => out.push_str(fragment),
    }
}

fn encode_float(f: f64, out: &mut String) {
    if f.is_finite() {
        // Debug keeps a trailing `.0` so integral floats decode as floats.
        let _ = write!(out, "{f:?}");
    } else {
        out.push_str("null");
    }
}

/// Quote and escape a string.
///
/// Printable ASCII passes through, `"` and `\` are backslash-escaped, the
/// five named control characters use their short escapes and everything
/// else is written as UTF-16 `\uXXXX` units.
pub fn encode_str(s: &str, out: &mut String) {
    out.reserve(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            ' '..='~' => out.push(c),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalars() {
        assert_eq!(encode(&Value::Null), "null");
        assert_eq!(encode(&Value::Bool(true)), "true");
        assert_eq!(encode(&Value::Int(-42)), "-42");
        assert_eq!(encode(&Value::Float(1.5)), "1.5");
        assert_eq!(encode(&Value::Float(f64::NAN)), "null");
    }

    #[test]
    fn test_string_escapes() {
        let s = "a\"b\\c\u{8}\u{c}\n\r\t\u{1}é";
        assert_eq!(
            encode(&Value::from(s)),
            r#""a\"b\\c\b\f\n\r\t\u0001\u00e9""#
        );
    }

    #[test]
    fn test_astral_char_uses_surrogates() {
        assert_eq!(encode(&Value::from("😀")), r#""\ud83d\ude00""#);
    }

    #[test]
    fn test_containers() {
        let v = Value::map()
            .with("list", vec![1, 2, 3])
            .with("name", "x")
            .with("none", Value::Null);
        assert_eq!(
            encode(&v),
            r#"{"list" : [1, 2, 3], "name" : "x", "none" : null}"#
        );
    }

    #[test]
    fn test_raw_is_verbatim() {
        let v = Value::map().with("params", Value::raw("[1,{\"a\":2}]"));
        assert_eq!(encode(&v), r#"{"params" : [1,{"a":2}]}"#);
    }
}
