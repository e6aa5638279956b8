//! Section table parsing.
//!
//! The section table is a run of `(section id, start page, page count)`
//! triplets after a `SECTIONHDR` marker, closed by an `ENDDATA` sentinel. Its
//! directory offset is only approximately right in some producers' output, so
//! the marker is searched in two passes:
//!
//! 1. a window of [`SCAN_WINDOW`] bytes either side of the expected offset;
//! 2. the whole file.
//!
//! A missing table is not an error: the container simply has no sections.

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, trace, warn};

use crate::rpt::layout::{
    BINARY_TABLE_MARKER, PAGE_TABLE_MARKER, SCAN_WINDOW, SECTION_ENTRY_SIZE, SECTION_MARKER,
    SECTION_SENTINEL,
};
use crate::rpt::types::error::Result;
use crate::rpt::types::models::{ContainerHeader, SectionEntry, SectionTable};
use crate::rpt::utils::{window_around, ByteReader};

pub fn parse(reader: &ByteReader, header: &ContainerHeader) -> Result<SectionTable> {
    info!("Parsing section table ({} sections declared)", header.section_count);

    let Some(marker) = locate(reader, header.table_offsets.section as usize) else {
        if header.section_count > 0 {
            warn!(
                "SECTIONHDR marker not found; {} declared sections ignored",
                header.section_count
            );
        }
        return Ok(SectionTable {
            entries: Vec::new(),
            declared_count: header.section_count,
        });
    };

    let mut pos = marker + SECTION_MARKER.len();
    let mut entries = Vec::new();
    let data = reader.bytes();

    while pos + SECTION_ENTRY_SIZE <= data.len() {
        let rest = &data[pos..];
        if rest.starts_with(SECTION_SENTINEL)
            || rest.starts_with(PAGE_TABLE_MARKER)
            || rest.starts_with(BINARY_TABLE_MARKER)
        {
            break;
        }

        let mut cursor = &rest[..SECTION_ENTRY_SIZE];
        let section_id = cursor.read_u32::<LittleEndian>()?;
        let start_page = cursor.read_u32::<LittleEndian>()?;
        let page_count = cursor.read_u32::<LittleEndian>()?;
        pos += SECTION_ENTRY_SIZE;

        if section_id == 0 && start_page == 0 && page_count == 0 {
            trace!("All-zero triplet ends the section table at {:#x}", pos);
            break;
        }
        if !is_sane(start_page, page_count, header.page_count) {
            warn!(
                "Skipping section {} (start {}, {} pages): outside pages 1..={}",
                section_id, start_page, page_count, header.page_count
            );
            continue;
        }
        entries.push(SectionEntry {
            section_id,
            start_page,
            page_count,
        });
    }

    if entries.len() != header.section_count as usize {
        warn!(
            "Section table holds {} usable entries, directory declares {}",
            entries.len(),
            header.section_count
        );
    }
    debug!("Section table at {:#x}: {} entries", marker, entries.len());

    Ok(SectionTable {
        entries,
        declared_count: header.section_count,
    })
}

fn is_sane(start_page: u32, page_count: u32, total_pages: u32) -> bool {
    start_page >= 1
        && page_count >= 1
        && (start_page as u64 + page_count as u64 - 1) <= total_pages as u64
}

fn locate(reader: &ByteReader, expected: usize) -> Option<usize> {
    if reader.has_marker_at(expected, SECTION_MARKER) {
        return Some(expected);
    }
    let near = reader.find_marker(SECTION_MARKER, window_around(expected, SCAN_WINDOW), |_, _| true);
    if near.is_some() {
        debug!("SECTIONHDR found near expected offset {:#x}", expected);
        return near;
    }
    debug!("SECTIONHDR not near {:#x}; scanning the whole file", expected);
    reader.find_marker(SECTION_MARKER, 0..reader.len(), |_, _| true)
}
