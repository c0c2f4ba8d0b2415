//! tnetstring codec
//!
//! mitmproxy serializes flows as a sequence of tnetstrings: `<len>:<payload><tag>`.
//!
//! | tag | type |
//! |-----|------|
//! | `,` | bytes |
//! | `;` | UTF-8 string |
//! | `#` | integer |
//! | `^` | float |
//! | `!` | boolean |
//! | `~` | null |
//! | `]` | list |
//! | `}` | dict (alternating keys and values) |

use std::io::{self, BufRead, Read};
use thiserror::Error;

/// Longest accepted length prefix, in digits
const MAX_PREFIX_DIGITS: usize = 12;

/// Parse errors
#[derive(Debug, Error)]
pub enum TnetstringError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("not a tnetstring: missing or invalid length prefix")]
    InvalidPrefix,

    #[error("not a tnetstring: absurdly large length prefix")]
    PrefixTooLong,

    #[error("truncated tnetstring: expected {expected} payload bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("unknown type tag: {0:?}")]
    UnknownTag(char),

    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    #[error("invalid float: {0:?}")]
    InvalidFloat(String),

    #[error("invalid boolean: {0:?}")]
    InvalidBool(String),

    #[error("null with non-empty payload")]
    NonEmptyNull,

    #[error("invalid UTF-8 in string: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    #[error("dict key without a value")]
    UnpairedKey,
}

pub type TnetstringResult<T> = Result<T, TnetstringError>;

/// A decoded tnetstring value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<Value>),
    /// Entries in serialization order
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Look up a dict entry by key. Keys may be bytes or strings.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_key() == Some(key.as_bytes()))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    fn as_key(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Raw bytes of a bytes or string value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.as_key()
    }

    /// Text of a bytes or string value; invalid UTF-8 is replaced
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convenience constructor for dicts with string keys
    pub fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.into()), v))
                .collect(),
        )
    }
}

/// Read the next value from a stream.
///
/// Returns `Ok(None)` when the stream ends cleanly before a new value starts.
pub fn read_value<R: BufRead>(reader: &mut R) -> TnetstringResult<Option<Value>> {
    let mut byte = [0u8; 1];
    if reader.read(&mut byte)? == 0 {
        return Ok(None);
    }

    let mut digits = String::new();
    while byte[0].is_ascii_digit() {
        digits.push(byte[0] as char);
        if digits.len() > MAX_PREFIX_DIGITS {
            return Err(TnetstringError::PrefixTooLong);
        }
        if reader.read(&mut byte)? == 0 {
            return Err(TnetstringError::InvalidPrefix);
        }
    }
    if byte[0] != b':' || digits.is_empty() {
        return Err(TnetstringError::InvalidPrefix);
    }
    let len: usize = digits.parse().map_err(|_| TnetstringError::PrefixTooLong)?;

    // payload plus the trailing type tag
    let mut payload = Vec::with_capacity(len.min(1 << 20) + 1);
    let found = reader.by_ref().take(len as u64 + 1).read_to_end(&mut payload)?;
    if found < len + 1 {
        return Err(TnetstringError::Truncated {
            expected: len,
            found: found.min(len),
        });
    }

    let tag = payload.pop().unwrap_or_default();
    parse_payload(tag, payload).map(Some)
}

/// Parse one value from the front of `data`, returning it and the remainder
pub fn parse(data: &[u8]) -> TnetstringResult<(Value, &[u8])> {
    let colon = data
        .iter()
        .take(MAX_PREFIX_DIGITS + 1)
        .position(|b| *b == b':')
        .ok_or(if data.len() > MAX_PREFIX_DIGITS {
            TnetstringError::PrefixTooLong
        } else {
            TnetstringError::InvalidPrefix
        })?;

    let digits = &data[..colon];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(TnetstringError::InvalidPrefix);
    }
    // all ASCII digits, so this is valid UTF-8
    let len: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|d| d.parse().ok())
        .ok_or(TnetstringError::InvalidPrefix)?;

    let rest = &data[colon + 1..];
    if rest.len() < len + 1 {
        return Err(TnetstringError::Truncated {
            expected: len,
            found: rest.len().saturating_sub(1),
        });
    }

    let value = parse_payload(rest[len], rest[..len].to_vec())?;
    Ok((value, &rest[len + 1..]))
}

fn parse_payload(tag: u8, payload: Vec<u8>) -> TnetstringResult<Value> {
    match tag {
        b',' => Ok(Value::Bytes(payload)),
        b';' => Ok(Value::String(String::from_utf8(payload)?)),
        b'#' => {
            let text = String::from_utf8_lossy(&payload);
            text.trim()
                .parse()
                .map(Value::Integer)
                .map_err(|_| TnetstringError::InvalidInteger(text.into_owned()))
        }
        b'^' => {
            let text = String::from_utf8_lossy(&payload);
            text.trim()
                .parse()
                .map(Value::Float)
                .map_err(|_| TnetstringError::InvalidFloat(text.into_owned()))
        }
        b'!' => match payload.as_slice() {
            b"true" => Ok(Value::Bool(true)),
            b"false" => Ok(Value::Bool(false)),
            other => Err(TnetstringError::InvalidBool(
                String::from_utf8_lossy(other).into_owned(),
            )),
        },
        b'~' => {
            if payload.is_empty() {
                Ok(Value::Null)
            } else {
                Err(TnetstringError::NonEmptyNull)
            }
        }
        b']' => {
            let mut items = Vec::new();
            let mut rest = payload.as_slice();
            while !rest.is_empty() {
                let (item, remainder) = parse(rest)?;
                items.push(item);
                rest = remainder;
            }
            Ok(Value::List(items))
        }
        b'}' => {
            let mut entries = Vec::new();
            let mut rest = payload.as_slice();
            while !rest.is_empty() {
                let (key, remainder) = parse(rest)?;
                if remainder.is_empty() {
                    return Err(TnetstringError::UnpairedKey);
                }
                let (value, remainder) = parse(remainder)?;
                entries.push((key, value));
                rest = remainder;
            }
            Ok(Value::Dict(entries))
        }
        other => Err(TnetstringError::UnknownTag(other as char)),
    }
}

/// Serialize a value
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    let (payload, tag): (Vec<u8>, u8) = match value {
        Value::Bytes(b) => (b.clone(), b','),
        Value::String(s) => (s.as_bytes().to_vec(), b';'),
        Value::Integer(i) => (i.to_string().into_bytes(), b'#'),
        Value::Float(f) => (format!("{:?}", f).into_bytes(), b'^'),
        Value::Bool(b) => (b.to_string().into_bytes(), b'!'),
        Value::Null => (Vec::new(), b'~'),
        Value::List(items) => {
            let mut payload = Vec::new();
            for item in items {
                encode_into(item, &mut payload);
            }
            (payload, b']')
        }
        Value::Dict(entries) => {
            let mut payload = Vec::new();
            for (k, v) in entries {
                encode_into(k, &mut payload);
                encode_into(v, &mut payload);
            }
            (payload, b'}')
        }
    };

    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(&payload);
    out.push(tag);
}
