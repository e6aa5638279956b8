//! Page table parsing.

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};

use crate::rpt::layout::{PAGE_ENTRY_SIZE, PAGE_TABLE_MARKER};
use crate::rpt::types::error::{Result, RptError};
use crate::rpt::types::models::{ContainerHeader, PageEntry};
use crate::rpt::utils::ByteReader;

/// Parsed page table plus where it ended, for locating the binary object table.
#[derive(Debug, Clone)]
pub struct PageTable {
    pub entries: Vec<PageEntry>,
    /// Absolute offset of the first byte after the last entry read.
    pub end_offset: usize,
}

/// Reads `header.page_count` entries following the `PAGETBLHDR` marker.
///
/// The directory offset is trusted when the marker is found there; otherwise
/// the whole file is scanned. A table cut short by the end of the file yields
/// the entries that are complete.
pub fn parse(reader: &ByteReader, header: &ContainerHeader) -> Result<PageTable> {
    info!("Parsing page table ({} pages declared)", header.page_count);

    let marker = locate(reader, header.table_offsets.page as usize)
        .ok_or_else(|| RptError::table("page", "PAGETBLHDR marker not found"))?;
    let start = marker + PAGE_TABLE_MARKER.len();

    let available = (reader.len() - start) / PAGE_ENTRY_SIZE;
    let count = header.page_count as usize;
    if available < count {
        warn!(
            "Page table truncated: {} entries declared, only {} present",
            count, available
        );
    }
    let count = count.min(available);

    let mut cursor = &reader.bytes()[start..start + count * PAGE_ENTRY_SIZE];
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let relative_offset = cursor.read_u32::<LittleEndian>()?;
        let _reserved = cursor.read_u32::<LittleEndian>()?;
        let line_width = cursor.read_u16::<LittleEndian>()?;
        let lines_per_page = cursor.read_u16::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let _reserved = cursor.read_u32::<LittleEndian>()?;

        let entry = PageEntry {
            page_number: i as u32 + 1,
            relative_offset,
            line_width,
            lines_per_page,
            uncompressed_size,
            compressed_size,
        };
        if entry.absolute_offset() + compressed_size as u64 > reader.len() as u64 {
            warn!(
                "Page {} data ({:#x} + {} bytes) extends past the end of the file",
                entry.page_number,
                entry.absolute_offset(),
                compressed_size
            );
        }
        entries.push(entry);
    }

    debug!("Page table at {:#x}: {} entries read", marker, entries.len());
    Ok(PageTable {
        entries,
        end_offset: start + count * PAGE_ENTRY_SIZE,
    })
}

/// Finds the `PAGETBLHDR` marker, ignoring the tail of a `BPAGETBLHDR` marker.
fn locate(reader: &ByteReader, expected: usize) -> Option<usize> {
    let is_page_marker = |data: &[u8], pos: usize| pos == 0 || data[pos - 1] != b'B';

    if reader.has_marker_at(expected, PAGE_TABLE_MARKER) && is_page_marker(reader.bytes(), expected) {
        return Some(expected);
    }
    warn!(
        "PAGETBLHDR not at directory offset {:#x}; scanning the whole file",
        expected
    );
    reader.find_marker(PAGE_TABLE_MARKER, 0..reader.len(), is_page_marker)
}
