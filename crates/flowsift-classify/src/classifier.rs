//! Projection of exchanges onto output events

use crate::rules::FilterRules;
use flowsift_core::events::{HttpRequestInfo, HttpResponseInfo};
use flowsift_core::{
    CompressedSocketEvent, Direction, Exchange, FlowEvent, HttpEvent, PayloadError, SocketEvent,
    SocketMessage,
};
use tracing::trace;

/// Decides, per exchange and per socket message, what gets emitted
#[derive(Debug, Clone, Default)]
pub struct FlowClassifier {
    rules: FilterRules,
}

impl FlowClassifier {
    pub fn new(rules: FilterRules) -> Self {
        Self { rules }
    }

    /// Messages to project for this exchange, in session order.
    ///
    /// `None` unless the exchange is to the gateway host and carries a
    /// socket session.
    pub fn socket_messages<'a>(&self, exchange: &'a Exchange) -> Option<&'a [SocketMessage]> {
        if !self.rules.is_gateway(exchange) {
            return None;
        }
        exchange.websocket.as_ref().map(|s| s.messages.as_slice())
    }

    /// Project one socket message.
    ///
    /// Client messages are parsed as JSON; server messages are passed
    /// through as hex without being decompressed.
    pub fn project_socket_message(
        &self,
        message: &SocketMessage,
    ) -> Result<FlowEvent, PayloadError> {
        match message.direction {
            Direction::Send => {
                let data = serde_json::from_str(message.text()?)?;
                Ok(FlowEvent::Ws(SocketEvent {
                    timestamp: message.timestamp,
                    direction: Direction::Send,
                    data,
                }))
            }
            Direction::Recv => Ok(FlowEvent::WsCompressed(CompressedSocketEvent {
                timestamp: message.timestamp,
                direction: Direction::Recv,
                compressed_data: hex::encode(&message.content),
            })),
        }
    }

    /// Project the HTTP side of an exchange.
    ///
    /// Returns `Ok(None)` when the exchange is filtered out. The body is
    /// only decoded and parsed once every filter has passed.
    pub fn project_http(&self, exchange: &Exchange) -> Result<Option<FlowEvent>, PayloadError> {
        if !self.rules.is_api(exchange) {
            return Ok(None);
        }

        let Some(response) = exchange.response.as_ref() else {
            trace!("Skipping {} {}: no response", exchange.method, exchange.path);
            return Ok(None);
        };

        if self.rules.is_excluded_path(&exchange.path) {
            trace!("Skipping {} {}: excluded path", exchange.method, exchange.path);
            return Ok(None);
        }

        if !self.rules.accepts_content_type(response) {
            trace!(
                "Skipping {} {}: content type {:?}",
                exchange.method,
                exchange.path,
                response.content_type()
            );
            return Ok(None);
        }

        let body = response.decoded_content()?;
        let data = serde_json::from_slice(&body)?;

        Ok(Some(FlowEvent::Http(HttpEvent {
            timestamp_start: exchange.timestamp_start,
            timestamp_end: exchange.timestamp_end,
            request: HttpRequestInfo {
                method: exchange.method.clone(),
                path: exchange.path.clone(),
            },
            response: HttpResponseInfo {
                status_code: response.status_code,
                data,
            },
        })))
    }
}
