//! Flow state to record conversion
//!
//! Maps the serialized state of a mitmproxy HTTP flow onto an [`Exchange`].
//! Only the fields the classifier reads are extracted.

use crate::tnetstring::Value;
use flowsift_core::record::{
    Direction, Exchange, Headers, Response, SocketMessage, SocketSession,
};
use flowsift_core::CaptureError;
use tracing::trace;

/// Oldest flow format with WebSocket messages stored on the HTTP flow
pub const MIN_FLOW_VERSION: i64 = 13;

/// Flow types that exist in dumps but carry no HTTP exchange
const NON_HTTP_FLOW_TYPES: &[&str] = &["tcp", "udp", "dns"];

/// Convert one top-level flow state.
///
/// Returns `Ok(None)` for non-HTTP flows.
pub fn exchange_from_state(state: &Value) -> Result<Option<Exchange>, CaptureError> {
    if !matches!(state, Value::Dict(_)) {
        return Err(CaptureError::InvalidFlow("flow is not a dict".to_string()));
    }

    let version = required(state, "version")?
        .as_i64()
        .ok_or_else(|| invalid("version is not an integer"))?;
    if version < MIN_FLOW_VERSION {
        return Err(CaptureError::UnsupportedVersion {
            found: version,
            minimum: MIN_FLOW_VERSION,
        });
    }

    let flow_type = required(state, "type")?
        .to_text()
        .ok_or_else(|| invalid("type is not a string"))?;
    if NON_HTTP_FLOW_TYPES.contains(&flow_type.as_str()) {
        trace!("Skipping {} flow", flow_type);
        return Ok(None);
    }
    if flow_type != "http" {
        return Err(invalid(format!("unknown flow type: {}", flow_type)));
    }

    let request = required(state, "request")?;
    let response = match state.get("response") {
        None | Some(Value::Null) => None,
        Some(value) => Some(response_from_state(value)?),
    };
    let websocket = match state.get("websocket") {
        None | Some(Value::Null) => None,
        Some(value) => Some(session_from_state(value)?),
    };

    Ok(Some(Exchange {
        host: text_field(request, "host")?,
        method: text_field(request, "method")?,
        path: text_field(request, "path")?,
        response,
        timestamp_start: optional_timestamp(state.get("client_conn"), "timestamp_start")?,
        timestamp_end: optional_timestamp(state.get("server_conn"), "timestamp_end")?,
        websocket,
    }))
}

fn response_from_state(state: &Value) -> Result<Response, CaptureError> {
    let status = required(state, "status_code")?
        .as_i64()
        .ok_or_else(|| invalid("response.status_code is not an integer"))?;
    let status_code = u16::try_from(status)
        .map_err(|_| invalid(format!("response.status_code out of range: {}", status)))?;

    let mut headers = Headers::new();
    if let Some(raw) = state.get("headers") {
        let pairs = raw
            .as_list()
            .ok_or_else(|| invalid("response.headers is not a list"))?;
        for pair in pairs {
            match pair.as_list() {
                Some([name, value]) => {
                    let name = name
                        .to_text()
                        .ok_or_else(|| invalid("header name is not a string"))?;
                    let value = value
                        .to_text()
                        .ok_or_else(|| invalid("header value is not a string"))?;
                    headers.insert(name, value);
                }
                _ => return Err(invalid("header is not a name/value pair")),
            }
        }
    }

    let content = match state.get("content") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => value
            .as_bytes()
            .ok_or_else(|| invalid("response.content is not bytes"))?
            .to_vec(),
    };

    Ok(Response::new(status_code, headers, content))
}

fn session_from_state(state: &Value) -> Result<SocketSession, CaptureError> {
    let messages = required(state, "messages")?
        .as_list()
        .ok_or_else(|| invalid("websocket.messages is not a list"))?;

    let mut session = SocketSession::default();
    for message in messages {
        // (opcode, from_client, content, timestamp, ...)
        let fields = message
            .as_list()
            .filter(|fields| fields.len() >= 4)
            .ok_or_else(|| invalid("websocket message is not a tuple"))?;

        let from_client = fields[1]
            .as_bool()
            .ok_or_else(|| invalid("websocket message from_client is not a bool"))?;
        let content = fields[2]
            .as_bytes()
            .ok_or_else(|| invalid("websocket message content is not bytes"))?;
        let timestamp = fields[3]
            .as_f64()
            .ok_or_else(|| invalid("websocket message timestamp is not a number"))?;

        let direction = if from_client {
            Direction::Send
        } else {
            Direction::Recv
        };
        session
            .messages
            .push(SocketMessage::new(timestamp, direction, content));
    }

    Ok(session)
}

fn required<'a>(state: &'a Value, key: &str) -> Result<&'a Value, CaptureError> {
    state
        .get(key)
        .ok_or_else(|| invalid(format!("missing field: {}", key)))
}

fn text_field(state: &Value, key: &str) -> Result<String, CaptureError> {
    required(state, key)?
        .to_text()
        .ok_or_else(|| invalid(format!("{} is not a string", key)))
}

fn optional_timestamp(conn: Option<&Value>, key: &str) -> Result<Option<f64>, CaptureError> {
    match conn.and_then(|c| c.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{} is not a number", key))),
    }
}

fn invalid(reason: impl Into<String>) -> CaptureError {
    CaptureError::InvalidFlow(reason.into())
}
