//! Streaming flow dump reader

use crate::flow::exchange_from_state;
use crate::tnetstring::{self, TnetstringError};
use flowsift_core::{CaptureError, Exchange};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, trace};

/// Reads exchanges from a mitmproxy flow dump, one flow at a time.
///
/// The reader is fused: after it yields an error it yields nothing else.
/// Dropping it closes the underlying file.
pub struct FlowReader<R> {
    inner: R,
    flows_read: u64,
    exchanges_yielded: u64,
    done: bool,
}

impl FlowReader<BufReader<File>> {
    /// Open a dump file for reading
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("Opened capture: {}", path.as_ref().display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> FlowReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            flows_read: 0,
            exchanges_yielded: 0,
            done: false,
        }
    }

    /// Number of top-level flows decoded so far, HTTP or not
    pub fn flows_read(&self) -> u64 {
        self.flows_read
    }

    fn fail(&mut self, err: CaptureError) -> Option<Result<Exchange, CaptureError>> {
        self.done = true;
        debug!(
            "Capture stream stopped after {} flows: {}",
            self.flows_read, err
        );
        Some(Err(err))
    }
}

impl<R: BufRead> Iterator for FlowReader<R> {
    type Item = Result<Exchange, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let state = match tnetstring::read_value(&mut self.inner) {
                Ok(Some(state)) => state,
                Ok(None) => {
                    self.done = true;
                    debug!(
                        "Capture exhausted: {} flows, {} HTTP exchanges",
                        self.flows_read, self.exchanges_yielded
                    );
                    return None;
                }
                Err(TnetstringError::Io(e)) => return self.fail(CaptureError::Io(e)),
                Err(e) => {
                    let err = CaptureError::Format {
                        flow: self.flows_read,
                        reason: e.to_string(),
                    };
                    return self.fail(err);
                }
            };
            self.flows_read += 1;

            match exchange_from_state(&state) {
                Ok(Some(exchange)) => {
                    self.exchanges_yielded += 1;
                    trace!(
                        "Flow #{}: {} {}{}",
                        self.flows_read,
                        exchange.method,
                        exchange.host,
                        exchange.path
                    );
                    return Some(Ok(exchange));
                }
                Ok(None) => continue,
                Err(e) => return self.fail(e),
            }
        }
        None
    }
}

impl<R: BufRead> std::iter::FusedIterator for FlowReader<R> {}
