//! Reassembly of the embedded attachment from its compressed chunks.

use std::path::Path;

use log::{debug, warn};

use super::codec::sniff;
use super::types::error::RptError;
use super::types::models::{AttachmentKind, ObjectHeader};

/// A chunk that could not be recovered.
#[derive(Debug)]
pub struct ChunkFailure {
    pub index: u32,
    pub error: RptError,
}

/// The attachment rebuilt from every chunk that decompressed.
#[derive(Debug)]
pub struct AssembledAttachment {
    pub bytes: Vec<u8>,
    pub kind: AttachmentKind,
    pub file_name: String,
    pub chunk_count: usize,
    pub failures: Vec<ChunkFailure>,
}

impl AssembledAttachment {
    /// True when every chunk was recovered, so `bytes` is the whole document.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Concatenates chunk payloads in table order and names the result.
///
/// `chunks` holds each chunk's index and decompression outcome. Failed
/// chunks are left out of the payload and reported in `failures`.
pub fn assemble(
    chunks: Vec<(u32, Result<Vec<u8>, RptError>)>,
    metadata: Option<&ObjectHeader>,
    source_name: &str,
) -> AssembledAttachment {
    let chunk_count = chunks.len();
    let mut bytes = Vec::new();
    let mut failures = Vec::new();

    for (index, outcome) in chunks {
        match outcome {
            Ok(payload) => bytes.extend_from_slice(&payload),
            Err(error) => {
                warn!("Attachment chunk {} skipped: {}", index, error);
                failures.push(ChunkFailure { index, error });
            }
        }
    }

    let recorded_name = metadata.and_then(ObjectHeader::file_name);
    let kind = sniff::classify(&bytes, recorded_name);
    let file_name = output_name(recorded_name, source_name, &kind);
    debug!(
        "Assembled {} bytes from {} chunks as {} ({})",
        bytes.len(),
        chunk_count,
        kind,
        file_name
    );

    AssembledAttachment {
        bytes,
        kind,
        file_name,
        chunk_count,
        failures,
    }
}

/// Prefers the recorded file name (without any directory part), else
/// `<container stem>.<extension>`.
fn output_name(recorded: Option<&str>, source_name: &str, kind: &AttachmentKind) -> String {
    let recorded = recorded
        .and_then(|r| r.rsplit(|c: char| c == '\\' || c == '/').next())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..");
    if let Some(name) = recorded {
        return name.to_string();
    }
    let stem = Path::new(source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("attachment");
    format!("{}.{}", stem, kind.extension())
}
