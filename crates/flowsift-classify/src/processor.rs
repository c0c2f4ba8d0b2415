//! The record loop: pull, project, emit

use crate::classifier::FlowClassifier;
use flowsift_core::events::format_timestamp;
use flowsift_core::{
    CaptureError, Exchange, ExportPlugin, FlowEvent, MalformedPolicy, PayloadError, PluginError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal processing error
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("malformed payload in {context}: {source}")]
    MalformedPayload {
        context: String,
        #[source]
        source: PayloadError,
    },

    #[error("export failed: {0}")]
    Export(#[from] PluginError),
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Exchanges pulled from the source
    pub exchanges: u64,
    pub socket_events: u64,
    pub http_events: u64,
    /// Events dropped under [`MalformedPolicy::Skip`]
    pub skipped_malformed: u64,
}

impl RunStats {
    pub fn events(&self) -> u64 {
        self.socket_events + self.http_events
    }
}

/// How a run ended without a fatal error
#[derive(Debug)]
pub struct RunOutcome {
    pub stats: RunStats,

    /// Set when the source stopped on a capture fault instead of running dry
    pub fault: Option<CaptureError>,
}

/// Drives exchanges through the classifier into a sink
pub struct FlowProcessor<S> {
    classifier: FlowClassifier,
    policy: MalformedPolicy,
    sink: S,
    stats: RunStats,
}

impl<S: ExportPlugin> FlowProcessor<S> {
    pub fn new(classifier: FlowClassifier, sink: S) -> Self {
        Self {
            classifier,
            policy: MalformedPolicy::default(),
            sink,
            stats: RunStats::default(),
        }
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process every exchange until the source runs dry or faults.
    ///
    /// A capture fault ends the run normally, with the fault recorded in
    /// the outcome. Everything emitted before it has been flushed.
    pub fn run<I>(&mut self, source: I) -> Result<RunOutcome, ProcessError>
    where
        I: IntoIterator<Item = Result<Exchange, CaptureError>>,
    {
        info!(
            "Processing capture with {} (policy: {:?})",
            self.sink.name(),
            self.policy
        );

        let mut fault = None;
        for record in source {
            match record {
                Ok(exchange) => self.process(&exchange)?,
                Err(e) => {
                    warn!("Capture stream faulted: {}", e);
                    fault = Some(e);
                    break;
                }
            }
        }

        self.sink.flush()?;

        let stats = self.stats;
        info!(
            "Processed {} exchanges: {} socket events, {} HTTP events, {} malformed skipped",
            stats.exchanges, stats.socket_events, stats.http_events, stats.skipped_malformed
        );

        Ok(RunOutcome { stats, fault })
    }

    /// Project a single exchange. Socket events go out before the HTTP event.
    pub fn process(&mut self, exchange: &Exchange) -> Result<(), ProcessError> {
        self.stats.exchanges += 1;

        if let Some(messages) = self.classifier.socket_messages(exchange) {
            debug!(
                "Socket session on {}: {} messages",
                exchange.host,
                messages.len()
            );
            for (index, message) in messages.iter().enumerate() {
                match self.classifier.project_socket_message(message) {
                    Ok(event) => {
                        self.emit(&event)?;
                        self.stats.socket_events += 1;
                    }
                    Err(e) => {
                        let context = format!(
                            "{} message #{} at {}",
                            message.direction.as_str(),
                            index,
                            format_timestamp(message.timestamp)
                        );
                        self.malformed(context, e)?;
                    }
                }
            }
        }

        match self.classifier.project_http(exchange) {
            Ok(Some(event)) => {
                if let Some(ts) = exchange.timestamp_start {
                    debug!(
                        "HTTP {} {} (connection opened {})",
                        exchange.method,
                        exchange.path,
                        format_timestamp(ts)
                    );
                }
                self.emit(&event)?;
                self.stats.http_events += 1;
            }
            Ok(None) => {}
            Err(e) => {
                let context = format!("{} {}{}", exchange.method, exchange.host, exchange.path);
                self.malformed(context, e)?;
            }
        }

        Ok(())
    }

    fn emit(&mut self, event: &FlowEvent) -> Result<(), ProcessError> {
        self.sink.export(event)?;
        Ok(())
    }

    fn malformed(&mut self, context: String, source: PayloadError) -> Result<(), ProcessError> {
        match self.policy {
            MalformedPolicy::Abort => {
                // Keep what was already emitted
                if let Err(e) = self.sink.flush() {
                    warn!("Flush before abort failed: {}", e);
                }
                Err(ProcessError::MalformedPayload { context, source })
            }
            MalformedPolicy::Skip => {
                warn!("Skipping malformed payload in {}: {}", context, source);
                self.stats.skipped_malformed += 1;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsift_core::{
        Direction, Headers, MemoryExporter, Response, SocketMessage, SocketSession,
    };
    use std::io;

    fn api(path: &str, body: &[u8]) -> Exchange {
        let headers: Headers = [("content-type", "application/json")].into_iter().collect();
        Exchange::new("discord.com", "GET", path)
            .with_response(Response::new(200, headers, body))
            .with_timestamps(1.0, 2.0)
    }

    fn gateway(messages: Vec<SocketMessage>) -> Exchange {
        Exchange::new("gateway.discord.gg", "GET", "/?v=9")
            .with_websocket(SocketSession::new(messages))
    }

    fn processor() -> FlowProcessor<MemoryExporter> {
        FlowProcessor::new(FlowClassifier::default(), MemoryExporter::new())
    }

    fn types(processor: &FlowProcessor<MemoryExporter>) -> Vec<&'static str> {
        processor
            .sink()
            .events
            .iter()
            .map(FlowEvent::event_type)
            .collect()
    }

    #[test]
    fn test_socket_events_in_session_order() {
        let mut processor = processor();
        let exchange = gateway(vec![
            SocketMessage::new(1.0, Direction::Send, br#"{"op":2}"#.to_vec()),
            SocketMessage::new(2.0, Direction::Recv, vec![0x78, 0x9c]),
            SocketMessage::new(3.0, Direction::Recv, vec![0x01]),
            SocketMessage::new(4.0, Direction::Send, br#"{"op":1,"d":null}"#.to_vec()),
        ]);

        let outcome = processor.run(vec![Ok(exchange)]).unwrap();
        assert!(outcome.fault.is_none());
        assert_eq!(outcome.stats.socket_events, 4);
        assert_eq!(types(&processor), vec!["ws", "ws_compressed", "ws_compressed", "ws"]);
    }

    #[test]
    fn test_socket_events_before_http_event() {
        // An exchange that is both a gateway session and an API response
        let mut processor = FlowProcessor::new(
            FlowClassifier::new(crate::FilterRules {
                gateway_host: "discord.com".to_string(),
                ..Default::default()
            }),
            MemoryExporter::new(),
        );
        let exchange = api("/api/v9/gateway", br#"{"url":"wss://gateway.discord.gg"}"#)
            .with_websocket(SocketSession::new(vec![SocketMessage::new(
                1.0,
                Direction::Recv,
                vec![0xff],
            )]));

        processor.run(vec![Ok(exchange)]).unwrap();
        assert_eq!(types(&processor), vec!["ws_compressed", "http"]);
    }

    #[test]
    fn test_unrelated_exchanges_emit_nothing() {
        let mut processor = processor();
        let records = vec![
            Ok(Exchange::new("cdn.discordapp.com", "GET", "/avatars/1.png")),
            Ok(Exchange::new("discord.com", "POST", "/api/v9/science")),
            Ok(api("/assets/manifest.json", b"{}")),
        ];

        let outcome = processor.run(records).unwrap();
        assert_eq!(outcome.stats.exchanges, 3);
        assert_eq!(outcome.stats.events(), 0);
        assert!(processor.sink().events.is_empty());
    }

    #[test]
    fn test_capture_fault_stops_run() {
        let mut processor = processor();
        let records = vec![
            Ok(api("/api/v9/users/@me", br#"{"id":"1"}"#)),
            Err(CaptureError::InvalidFlow("truncated".to_string())),
            Ok(api("/api/v9/users/2", br#"{"id":"2"}"#)),
        ];

        let outcome = processor.run(records).unwrap();
        assert!(matches!(outcome.fault, Some(CaptureError::InvalidFlow(_))));
        assert_eq!(outcome.stats.exchanges, 1);
        assert_eq!(processor.sink().events.len(), 1);
    }

    #[test]
    fn test_malformed_payload_aborts_by_default() {
        let mut processor = processor();
        let records = vec![
            Ok(api("/api/v9/users/@me", br#"{"id":"1"}"#)),
            Ok(gateway(vec![SocketMessage::new(
                5.0,
                Direction::Send,
                b"not json".to_vec(),
            )])),
            Ok(api("/api/v9/users/2", br#"{"id":"2"}"#)),
        ];

        let err = processor.run(records).unwrap_err();
        match err {
            ProcessError::MalformedPayload { context, .. } => {
                assert!(context.starts_with("send message #0"))
            }
            other => panic!("unexpected error: {}", other),
        }
        // prior output is kept, nothing after the failure is written
        assert_eq!(types(&processor), vec!["http"]);
    }

    #[test]
    fn test_malformed_payload_skip_policy() {
        let mut processor = processor().with_policy(MalformedPolicy::Skip);
        let records = vec![
            Ok(gateway(vec![
                SocketMessage::new(1.0, Direction::Send, b"{".to_vec()),
                SocketMessage::new(2.0, Direction::Send, br#"{"op":3}"#.to_vec()),
            ])),
            Ok(api("/api/v9/users/@me", b"<!doctype html>")),
            Ok(api("/api/v9/users/2", br#"{"id":"2"}"#)),
        ];

        let outcome = processor.run(records).unwrap();
        assert_eq!(outcome.stats.skipped_malformed, 2);
        assert_eq!(outcome.stats.socket_events, 1);
        assert_eq!(outcome.stats.http_events, 1);
        assert_eq!(types(&processor), vec!["ws", "http"]);
    }

    struct FailingSink;

    impl flowsift_core::PluginInfo for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn version(&self) -> &str {
            "0.0.0"
        }
    }

    impl ExportPlugin for FailingSink {
        fn export(&mut self, _event: &FlowEvent) -> flowsift_core::PluginResult<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed").into())
        }

        fn events_written(&self) -> u64 {
            0
        }
    }

    #[test]
    fn test_sink_failure_is_fatal() {
        let mut processor = FlowProcessor::new(FlowClassifier::default(), FailingSink);
        let err = processor
            .run(vec![Ok(api("/api/v9/users/@me", b"{}"))])
            .unwrap_err();
        assert!(matches!(err, ProcessError::Export(PluginError::IoError(_))));
    }
}
