//! Output events
//!
//! Every event serializes to one self-contained JSON object with a `type`
//! tag. Field order on the wire follows field order here.

use crate::record::Direction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// All event kinds written to the output stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    /// Client socket message, payload parsed as JSON
    #[serde(rename = "ws")]
    Ws(SocketEvent),

    /// Server socket message, payload left compressed
    #[serde(rename = "ws_compressed")]
    WsCompressed(CompressedSocketEvent),

    /// API request/response pair
    #[serde(rename = "http")]
    Http(HttpEvent),
}

impl FlowEvent {
    /// Get the event type string
    pub fn event_type(&self) -> &'static str {
        match self {
            FlowEvent::Ws(_) => "ws",
            FlowEvent::WsCompressed(_) => "ws_compressed",
            FlowEvent::Http(_) => "http",
        }
    }
}

/// Socket message carrying decoded JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocketEvent {
    pub timestamp: f64,
    pub direction: Direction,
    pub data: Value,
}

/// Socket message carrying the raw frame as lowercase hex
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedSocketEvent {
    pub timestamp: f64,
    pub direction: Direction,
    pub compressed_data: String,
}

/// HTTP exchange with a JSON response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpEvent {
    /// Client connection start
    pub timestamp_start: Option<f64>,

    /// Server connection end
    pub timestamp_end: Option<f64>,

    pub request: HttpRequestInfo,
    pub response: HttpResponseInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequestInfo {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponseInfo {
    pub status_code: u16,
    pub data: Value,
}

/// Render a capture timestamp (seconds since epoch) for log output
pub fn format_timestamp(ts: f64) -> String {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9) as u32;
    match DateTime::<Utc>::from_timestamp(secs as i64, nanos) {
        Some(dt) => dt.to_rfc3339(),
        None => ts.to_string(),
    }
}
