use super::{EnvelopeError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
    encoder.write_all(data).map_err(EnvelopeError::Compress)?;
    encoder.finish().map_err(EnvelopeError::Compress)
}

/// Upper bound on an inflated body.
pub const MAX_INFLATED_BYTES: usize = 64 * 1024 * 1024;

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    gunzip_with_limit(data, MAX_INFLATED_BYTES)
}

/// Inflates `data`, failing once the output would exceed `limit` bytes.
pub fn gunzip_with_limit(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).min(limit));
    GzDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(EnvelopeError::Decompress)?;
    if out.len() > limit {
        return Err(EnvelopeError::TooLarge { limit });
    }
    Ok(out)
}
