//! Byte-stream transforms between incoming S3 data and the preview file
//!
//! A transform is fed arbitrary slices of the source stream and yields
//! whatever output is decodable so far; `flush` drains anything still
//! buffered once the stream ends. Selection happens once, from the key's
//! extension, when a streaming preview is constructed.

use std::io::Write;

use flate2::write::GzDecoder;

use crate::errors::{Result, S3ScopeError};

pub trait StreamTransform: Send {
    /// Feed source bytes; returns the decoded output available so far.
    fn transform(&mut self, data: &[u8]) -> Result<Vec<u8>>;

    /// Drain any remaining buffered output at end of stream.
    fn flush(&mut self) -> Result<Vec<u8>>;
}

/// Identity transform for uncompressed objects.
pub struct PassThroughTransform;

impl StreamTransform for PassThroughTransform {
    fn transform(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Streaming gzip inflate. Accepts partial input; the gzip header is
/// buffered internally until complete.
pub struct GzipTransform {
    decoder: GzDecoder<Vec<u8>>,
}

impl GzipTransform {
    pub fn new() -> Self {
        GzipTransform {
            decoder: GzDecoder::new(Vec::new()),
        }
    }
}

impl Default for GzipTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTransform for GzipTransform {
    fn transform(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        self.decoder
            .write_all(data)
            .map_err(|err| S3ScopeError::Decode(format!("gzip: {}", err)))?;
        self.decoder
            .flush()
            .map_err(|err| S3ScopeError::Decode(format!("gzip: {}", err)))?;
        Ok(std::mem::take(self.decoder.get_mut()))
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        self.decoder
            .try_finish()
            .map_err(|err| S3ScopeError::Decode(format!("gzip: {}", err)))?;
        Ok(std::mem::take(self.decoder.get_mut()))
    }
}

/// Streaming zstd decode. The decoder buffers frame boundaries internally
/// and tolerates the stream simply ending.
pub struct ZstdTransform {
    decoder: zstd::stream::write::Decoder<'static, Vec<u8>>,
}

impl ZstdTransform {
    pub fn new() -> Result<Self> {
        let decoder = zstd::stream::write::Decoder::new(Vec::new())
            .map_err(|err| S3ScopeError::Decode(format!("zstd: {}", err)))?;
        Ok(ZstdTransform { decoder })
    }
}

impl StreamTransform for ZstdTransform {
    fn transform(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.decoder
            .write_all(data)
            .map_err(|err| S3ScopeError::Decode(format!("zstd: {}", err)))?;
        Ok(std::mem::take(self.decoder.get_mut()))
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        let _ = self.decoder.flush();
        Ok(std::mem::take(self.decoder.get_mut()))
    }
}

/// Pick the transform for a key from its extension.
pub fn transform_for_key(key: &str) -> Result<Box<dyn StreamTransform>> {
    let lower = key.to_ascii_lowercase();
    if lower.ends_with(".gz") {
        Ok(Box::new(GzipTransform::new()))
    } else if lower.ends_with(".zst") || lower.ends_with(".zstd") {
        Ok(Box::new(ZstdTransform::new()?))
    } else {
        Ok(Box::new(PassThroughTransform))
    }
}
