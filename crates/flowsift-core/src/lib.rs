//! flowsift core - record model, output events, and configuration
//!
//! This crate provides the types shared by every stage of flowsift:
//!
//! - **Records**: decoded exchanges and socket sessions, as handed over by a capture reader
//! - **Events**: the normalized JSON-lines output schema
//! - **Content**: response body decoding per `content-encoding`
//! - **Config**: TOML configuration with environment overrides
//! - **Plugins**: the export plugin trait

pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod plugins;
pub mod record;

// Re-export commonly used types
pub use config::{ConfigLoader, FlowsiftConfig, MalformedPolicy};
pub use error::{CaptureError, PayloadError};
pub use events::{CompressedSocketEvent, FlowEvent, HttpEvent, SocketEvent};
pub use plugins::{ExportPlugin, MemoryExporter, PluginError, PluginInfo, PluginResult};
pub use record::{Direction, Exchange, Headers, Response, SocketMessage, SocketSession};

/// flowsift version
pub const FLOWSIFT_VERSION: &str = env!("CARGO_PKG_VERSION");
