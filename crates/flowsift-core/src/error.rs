//! Error types shared between the capture reader and the classifier

use thiserror::Error;

/// Fault raised by a record source while reading a capture.
///
/// Any of these ends the record stream. Records yielded before the fault
/// are complete and valid.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data format in flow #{flow}: {reason}")]
    Format { flow: u64, reason: String },

    #[error("flow version {found} is not supported (minimum {minimum})")]
    UnsupportedVersion { found: i64, minimum: i64 },

    #[error("invalid flow: {0}")]
    InvalidFlow(String),
}

/// A payload that was expected to hold JSON (possibly compressed) but doesn't
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("failed to decode {encoding} content: {source}")]
    Decompress {
        encoding: String,
        #[source]
        source: std::io::Error,
    },
}
