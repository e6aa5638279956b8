//! zlib (DEFLATE) compression of page records and attachment chunks.
//!
//! Every compressed record in a container is an independent zlib stream whose
//! inflated length is recorded next to it in a table. The recorded length is
//! the integrity check: inflating to anything else is a failure.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::trace;

use crate::rpt::types::error::{Result, RptError};

/// Inflates `payload`, requiring exactly `expected_size` bytes of output.
///
/// `entry` names the record in error messages (for example `page 7`).
pub fn inflate(payload: &[u8], expected_size: u32, entry: &str) -> Result<Vec<u8>> {
    trace!(
        "Inflating {}: {} bytes -> {} bytes (expected)",
        entry,
        payload.len(),
        expected_size
    );
    let mut output = Vec::with_capacity(expected_size as usize);
    // One byte past the expectation is enough to detect an oversized stream.
    let mut decoder = ZlibDecoder::new(payload).take(expected_size as u64 + 1);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| RptError::decompression(entry, format!("zlib stream is corrupt: {}", e)))?;

    if output.len() > expected_size as usize {
        return Err(RptError::decompression(
            entry,
            format!("inflated past the expected {} bytes", expected_size),
        ));
    }
    if output.len() < expected_size as usize {
        return Err(RptError::decompression(
            entry,
            format!("inflated to {} bytes, expected {}", output.len(), expected_size),
        ));
    }
    Ok(output)
}

/// Deflates `data` into a standalone zlib stream.
pub fn deflate(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 64), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflate_restores_deflated_bytes() {
        let text = b"ACCOUNT STATEMENT\nBRANCH 014\n".repeat(20);
        let packed = deflate(&text, Compression::default()).expect("deflate");
        assert!(packed.len() < text.len());
        let unpacked = inflate(&packed, text.len() as u32, "page 1").expect("inflate");
        assert_eq!(unpacked, text);
    }

    #[test]
    fn inflate_rejects_length_mismatch() {
        let packed = deflate(b"twelve bytes", Compression::default()).expect("deflate");
        let short = inflate(&packed, 20, "page 3").unwrap_err();
        assert!(matches!(short, RptError::Decompression { ref entry, .. } if entry == "page 3"));
        let long = inflate(&packed, 4, "page 3").unwrap_err();
        assert!(long.to_string().contains("expected 4 bytes"));
    }

    #[test]
    fn inflate_rejects_garbage() {
        let err = inflate(&[0xde, 0xad, 0xbe, 0xef], 10, "chunk 2").unwrap_err();
        assert!(err.is_recoverable());
    }
}
