//! Plugin traits for the output stage
//!
//! Events leave flowsift through an [`ExportPlugin`]. Export is synchronous:
//! an event is fully written before the next record is read.

use crate::events::FlowEvent;
use thiserror::Error;

/// Plugin error type
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Basic plugin information
pub trait PluginInfo {
    /// Plugin name
    fn name(&self) -> &str;

    /// Plugin version
    fn version(&self) -> &str;

    /// Plugin description
    fn description(&self) -> &str {
        ""
    }
}

/// Export plugin - writes events to a destination
pub trait ExportPlugin: PluginInfo {
    /// Write a single event
    fn export(&mut self, event: &FlowEvent) -> PluginResult<()>;

    /// Flush anything buffered
    fn flush(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Number of events written so far
    fn events_written(&self) -> u64;
}

/// Collects events in memory
///
/// Handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryExporter {
    pub events: Vec<FlowEvent>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PluginInfo for MemoryExporter {
    fn name(&self) -> &str {
        "memory-exporter"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Collects events in memory"
    }
}

impl ExportPlugin for MemoryExporter {
    fn export(&mut self, event: &FlowEvent) -> PluginResult<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn events_written(&self) -> u64 {
        self.events.len() as u64
    }
}
