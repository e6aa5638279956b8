//! Binary object table parsing.
//!
//! Only read when the directory declares a non-zero count. Each 16-byte entry
//! points at one zlib-compressed chunk of the single embedded attachment.

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};

use crate::rpt::layout::{BINARY_ENTRY_SIZE, BINARY_TABLE_MARKER, SCAN_WINDOW};
use crate::rpt::types::error::Result;
use crate::rpt::types::models::{BinaryObjectEntry, ContainerHeader};
use crate::rpt::utils::ByteReader;

/// Reads the binary object table.
///
/// `page_table_end` is where the page table stopped; producers place this
/// table right behind it, so that region is searched before the whole file.
pub fn parse(
    reader: &ByteReader,
    header: &ContainerHeader,
    page_table_end: usize,
) -> Result<Vec<BinaryObjectEntry>> {
    if header.binary_object_count == 0 {
        return Ok(Vec::new());
    }
    info!("Parsing binary object table ({} entries declared)", header.binary_object_count);

    let Some(marker) = locate(reader, header.table_offsets.binary as usize, page_table_end) else {
        warn!(
            "BPAGETBLHDR marker not found; {} declared attachment chunks ignored",
            header.binary_object_count
        );
        return Ok(Vec::new());
    };
    let start = marker + BINARY_TABLE_MARKER.len();

    let available = (reader.len() - start) / BINARY_ENTRY_SIZE;
    let count = header.binary_object_count as usize;
    if available < count {
        warn!(
            "Binary object table truncated: {} entries declared, only {} present",
            count, available
        );
    }
    let count = count.min(available);

    let mut cursor = &reader.bytes()[start..start + count * BINARY_ENTRY_SIZE];
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let relative_offset = cursor.read_u32::<LittleEndian>()?;
        let _reserved = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        entries.push(BinaryObjectEntry {
            index: i as u32 + 1,
            relative_offset,
            uncompressed_size,
            compressed_size,
        });
    }

    debug!("Binary object table at {:#x}: {} entries", marker, entries.len());
    Ok(entries)
}

fn locate(reader: &ByteReader, expected: usize, page_table_end: usize) -> Option<usize> {
    if reader.has_marker_at(expected, BINARY_TABLE_MARKER) {
        return Some(expected);
    }
    let tail = page_table_end..page_table_end.saturating_add(SCAN_WINDOW);
    reader
        .find_marker(BINARY_TABLE_MARKER, tail, |_, _| true)
        .or_else(|| {
            debug!("BPAGETBLHDR not behind the page table; scanning the whole file");
            reader.find_marker(BINARY_TABLE_MARKER, 0..reader.len(), |_, _| true)
        })
}
