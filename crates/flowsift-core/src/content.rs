//! Response body decoding
//!
//! Capture dumps keep bodies exactly as they crossed the wire. Before a body
//! can be parsed it has to be decoded according to its `content-encoding`.

use crate::error::PayloadError;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::borrow::Cow;
use std::io::Read;
use tracing::trace;

/// Brotli decoder buffer size
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Decode `content` according to a `content-encoding` header value.
///
/// A missing header, an empty value, `identity` and `none` return the
/// content unchanged without copying.
pub fn decode_content<'a>(
    content: &'a [u8],
    encoding: Option<&str>,
) -> Result<Cow<'a, [u8]>, PayloadError> {
    let encoding = match encoding.map(|e| e.trim().to_ascii_lowercase()) {
        None => return Ok(Cow::Borrowed(content)),
        Some(e) if e.is_empty() || e == "identity" || e == "none" => {
            return Ok(Cow::Borrowed(content))
        }
        Some(e) => e,
    };

    let decoded = match encoding.as_str() {
        "gzip" | "x-gzip" => read_all(GzDecoder::new(content)),
        // Servers disagree on whether deflate means zlib-wrapped or raw
        "deflate" => read_all(ZlibDecoder::new(content))
            .or_else(|_| read_all(DeflateDecoder::new(content))),
        "br" => read_all(brotli::Decompressor::new(content, BROTLI_BUFFER_SIZE)),
        "zstd" => zstd::stream::read::Decoder::new(content).and_then(read_all),
        _ => return Err(PayloadError::UnsupportedEncoding(encoding)),
    };

    let decoded = decoded.map_err(|source| PayloadError::Decompress {
        encoding: encoding.clone(),
        source,
    })?;

    trace!(
        "Decoded {} content: {} -> {} bytes",
        encoding,
        content.len(),
        decoded.len()
    );
    Ok(Cow::Owned(decoded))
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
