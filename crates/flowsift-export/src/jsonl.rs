//! JSONL exporter

use flowsift_core::events::FlowEvent;
use flowsift_core::plugins::{ExportPlugin, PluginInfo, PluginResult};
use std::io::{self, BufWriter, StdoutLock, Write};
use tracing::debug;

/// JSONL exporter configuration
#[derive(Debug, Clone)]
pub struct JsonlExporterConfig {
    /// Flush after each write
    pub flush_each: bool,
}

impl Default for JsonlExporterConfig {
    fn default() -> Self {
        Self { flush_each: true }
    }
}

/// Writes one compact JSON object per line
pub struct JsonlExporter<W: Write> {
    config: JsonlExporterConfig,
    writer: W,
    events_written: u64,
}

impl<W: Write> JsonlExporter<W> {
    pub fn new(writer: W, config: JsonlExporterConfig) -> Self {
        Self {
            config,
            writer,
            events_written: 0,
        }
    }

    /// Unwrap the underlying writer. Buffered data is not flushed.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonlExporter<BufWriter<StdoutLock<'static>>> {
    /// Exporter on locked standard output
    pub fn stdout(config: JsonlExporterConfig) -> Self {
        debug!("JSONL exporter writing to stdout");
        Self::new(BufWriter::new(io::stdout().lock()), config)
    }
}

impl<W: Write> PluginInfo for JsonlExporter<W> {
    fn name(&self) -> &str {
        "jsonl-exporter"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Exports events as JSON lines"
    }
}

impl<W: Write> ExportPlugin for JsonlExporter<W> {
    fn export(&mut self, event: &FlowEvent) -> PluginResult<()> {
        let json = serde_json::to_string(event)?;
        writeln!(self.writer, "{}", json)?;

        if self.config.flush_each {
            self.writer.flush()?;
        }

        self.events_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> PluginResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn events_written(&self) -> u64 {
        self.events_written
    }
}
