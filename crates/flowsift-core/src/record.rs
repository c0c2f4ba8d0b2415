//! Decoded capture records
//!
//! An [`Exchange`] is one request/response pair as produced by a capture
//! reader. When the exchange is a WebSocket upgrade it also carries the
//! [`SocketSession`] that followed it.

use crate::content::decode_content;
use crate::error::PayloadError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// One captured request/response interaction
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// Destination host of the request
    pub host: String,

    /// HTTP method
    pub method: String,

    /// Request path, including the query string
    pub path: String,

    /// Response, if one was received
    pub response: Option<Response>,

    /// Start of the client connection (seconds since epoch)
    pub timestamp_start: Option<f64>,

    /// End of the server connection (seconds since epoch)
    pub timestamp_end: Option<f64>,

    /// WebSocket session established by this exchange
    pub websocket: Option<SocketSession>,
}

impl Exchange {
    /// Create an exchange with no response, timestamps, or socket session
    pub fn new(host: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            method: method.into(),
            path: path.into(),
            response: None,
            timestamp_start: None,
            timestamp_end: None,
            websocket: None,
        }
    }

    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_timestamps(mut self, start: f64, end: f64) -> Self {
        self.timestamp_start = Some(start);
        self.timestamp_end = Some(end);
        self
    }

    pub fn with_websocket(mut self, session: SocketSession) -> Self {
        self.websocket = Some(session);
        self
    }
}

/// HTTP response of an exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status_code: u16,
    pub headers: Headers,

    /// Body as it was on the wire (still content-encoded)
    pub content: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16, headers: Headers, content: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            headers,
            content: content.into(),
        }
    }

    /// Value of the `content-type` header
    pub fn content_type(&self) -> Option<Cow<'_, str>> {
        self.headers.get("content-type")
    }

    /// Body with its `content-encoding` removed
    pub fn decoded_content(&self) -> Result<Cow<'_, [u8]>, PayloadError> {
        let encoding = self.headers.get("content-encoding");
        decode_content(&self.content, encoding.as_deref())
    }
}

/// Ordered header list with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header. Names are stored lowercased.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
    }

    /// Look up a header by name, ignoring case.
    ///
    /// Repeated headers are joined with `", "`.
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        let mut values = self
            .entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str());

        let first = values.next()?;
        match values.next() {
            None => Some(Cow::Borrowed(first)),
            Some(second) => {
                let mut joined = format!("{}, {}", first, second);
                for value in values {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                Some(Cow::Owned(joined))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Messages exchanged over a WebSocket, in capture order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocketSession {
    pub messages: Vec<SocketMessage>,
}

impl SocketSession {
    pub fn new(messages: Vec<SocketMessage>) -> Self {
        Self { messages }
    }
}

/// Which side of the connection sent a socket message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Sent by the local client
    #[serde(rename = "send")]
    Send,
    /// Received from the remote server
    #[serde(rename = "recv")]
    Recv,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Recv => "recv",
        }
    }
}

/// One WebSocket frame
#[derive(Debug, Clone, PartialEq)]
pub struct SocketMessage {
    /// Seconds since epoch
    pub timestamp: f64,
    pub direction: Direction,

    /// Raw frame payload
    pub content: Vec<u8>,
}

impl SocketMessage {
    pub fn new(timestamp: f64, direction: Direction, content: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            direction,
            content: content.into(),
        }
    }

    /// Payload decoded as UTF-8 text
    pub fn text(&self) -> Result<&str, PayloadError> {
        Ok(std::str::from_utf8(&self.content)?)
    }
}
