//! Container header parsing.
//!
//! This module handles:
//! - Validating the `RPTFILEHDR` signature and minimum size
//! - Parsing the tab-delimited `domain:species` and timestamp line
//! - Reading the three-row table directory

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, trace, warn};

use crate::rpt::layout::{
    TableKind, DIRECTORY_ROWS, DIRECTORY_ROW_SIZE, FILE_SIGNATURE, HEADER_TERMINATOR,
    INSTANCE_BASE, INSTANCE_MARKER, MIN_HEADER_SIZE, TABLE_DIRECTORY_OFFSET,
};
use crate::rpt::types::error::{Result, RptError};
use crate::rpt::types::models::{ContainerHeader, TableLocation, TableOffsets};
use crate::rpt::utils::ByteReader;

/// Parses the fixed header of a container.
///
/// # Header Structure
/// ```text
/// [0x000] RPTFILEHDR \t DDDD:SSSS \t timestamp 0x1A
/// [0x0F0] RPTINSTHDR
/// [0x1F0] 3 x (type u32, count u32, offset u32, reserved u32)
/// ```
pub fn parse(reader: &ByteReader) -> Result<ContainerHeader> {
    info!("Parsing container header");

    if reader.len() < MIN_HEADER_SIZE {
        return Err(RptError::Format(format!(
            "file is {} bytes, smaller than the {}-byte minimum header",
            reader.len(),
            MIN_HEADER_SIZE
        )));
    }
    if !reader.has_marker_at(0, FILE_SIGNATURE) {
        return Err(RptError::Format("missing RPTFILEHDR signature".to_string()));
    }

    let (domain_id, species_id, timestamp) = parse_header_line(reader.bytes())?;
    trace!("Header line: domain={} species={} timestamp={:?}", domain_id, species_id, timestamp);

    if !reader.has_marker_at(INSTANCE_BASE as usize, INSTANCE_MARKER) {
        warn!("RPTINSTHDR marker missing at {:#x}; continuing", INSTANCE_BASE);
    }

    let [pages, sections, binary] = parse_directory(reader)?;

    if pages.count == 0 {
        return Err(RptError::Format("table directory declares zero pages".to_string()));
    }
    for (kind, location) in [
        (TableKind::Page, pages),
        (TableKind::Section, sections),
        (TableKind::Binary, binary),
    ] {
        if location.count > 0 && location.offset as usize >= reader.len() {
            warn!(
                "Directory places the {} table at {:#x}, past the end of the file ({} bytes)",
                kind.name(),
                location.offset,
                reader.len()
            );
        }
    }

    let header = ContainerHeader {
        domain_id,
        species_id,
        timestamp,
        page_count: pages.count,
        section_count: sections.count,
        binary_object_count: binary.count,
        table_offsets: TableOffsets {
            page: pages.offset,
            section: sections.offset,
            binary: binary.offset,
        },
    };

    info!(
        "Header parsed: domain={}, species={}, pages={}, sections={}, binary objects={}",
        header.domain_id,
        header.species_id,
        header.page_count,
        header.section_count,
        header.binary_object_count
    );
    Ok(header)
}

/// Extracts `(domain, species, timestamp)` from the signature line.
fn parse_header_line(data: &[u8]) -> Result<(u32, u32, String)> {
    let limit = data.len().min(INSTANCE_BASE as usize);
    let line = &data[FILE_SIGNATURE.len()..limit];
    let end = line
        .iter()
        .position(|&b| b == HEADER_TERMINATOR)
        .ok_or_else(|| RptError::Format("header line terminator not found".to_string()))?;
    let line = String::from_utf8_lossy(&line[..end]);

    let mut fields = line.split('\t').filter(|f| !f.is_empty());
    let ids = fields
        .next()
        .ok_or_else(|| RptError::Format("header line has no domain:species field".to_string()))?;
    let timestamp = fields.next().unwrap_or_default().trim().to_string();

    let (domain, species) = ids.split_once(':').ok_or_else(|| {
        RptError::Format(format!("expected domain:species in header, found {:?}", ids))
    })?;
    let parse_id = |what: &str, raw: &str| {
        raw.trim()
            .parse::<u32>()
            .map_err(|e| RptError::Format(format!("invalid {} id {:?}: {}", what, raw, e)))
    };
    Ok((parse_id("domain", domain)?, parse_id("species", species)?, timestamp))
}

/// Reads the three directory rows, in page/section/binary order.
fn parse_directory(reader: &ByteReader) -> Result<[TableLocation; DIRECTORY_ROWS]> {
    let raw = reader.require(
        TABLE_DIRECTORY_OFFSET as u64,
        (DIRECTORY_ROWS * DIRECTORY_ROW_SIZE) as u64,
        "table directory",
    )?;
    let mut cursor = raw;
    let mut rows = [TableLocation::default(); DIRECTORY_ROWS];

    for (row, expected) in [TableKind::Page, TableKind::Section, TableKind::Binary]
        .into_iter()
        .enumerate()
    {
        let kind = cursor.read_u32::<LittleEndian>()?;
        let count = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u32::<LittleEndian>()?;
        let _reserved = cursor.read_u32::<LittleEndian>()?;

        if kind != expected as u32 {
            warn!(
                "Directory row {} has type {}, expected {} ({} table)",
                row,
                kind,
                expected as u32,
                expected.name()
            );
        }
        debug!("Directory row {}: {} table, count={}, offset={:#x}", row, expected.name(), count, offset);
        rows[row] = TableLocation { count, offset };
    }
    Ok(rows)
}

/// Renders the signature line written at offset zero.
pub fn header_line(domain_id: u32, species_id: u32, timestamp: &str) -> Vec<u8> {
    let mut line = FILE_SIGNATURE.to_vec();
    line.extend_from_slice(format!("\t{:04}:{}\t{}", domain_id, species_id, timestamp).as_bytes());
    line.push(HEADER_TERMINATOR);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn raw_header(line: &[u8], rows: [(u32, u32, u32); 3]) -> Vec<u8> {
        let mut data = vec![0u8; MIN_HEADER_SIZE];
        data[..line.len()].copy_from_slice(line);
        data[INSTANCE_BASE as usize..INSTANCE_BASE as usize + INSTANCE_MARKER.len()]
            .copy_from_slice(INSTANCE_MARKER);
        let mut dir = Vec::new();
        for (kind, count, offset) in rows {
            dir.write_u32::<LittleEndian>(kind).unwrap();
            dir.write_u32::<LittleEndian>(count).unwrap();
            dir.write_u32::<LittleEndian>(offset).unwrap();
            dir.write_u32::<LittleEndian>(0).unwrap();
        }
        data[TABLE_DIRECTORY_OFFSET..TABLE_DIRECTORY_OFFSET + dir.len()].copy_from_slice(&dir);
        data
    }

    #[test]
    fn parses_ids_timestamp_and_directory() {
        let line = header_line(1, 52759, "2024/01/15 10:30:45.000");
        let data = raw_header(&line, [(1, 2, 0x400), (2, 1, 0x300), (3, 2, 0x480)]);
        let header = parse(&ByteReader::from_vec(data)).expect("header");
        assert_eq!(header.domain_id, 1);
        assert_eq!(header.species_id, 52759);
        assert_eq!(header.timestamp, "2024/01/15 10:30:45.000");
        assert_eq!(header.page_count, 2);
        assert_eq!(header.section_count, 1);
        assert_eq!(header.binary_object_count, 2);
        assert_eq!(header.table_offsets, TableOffsets { page: 0x400, section: 0x300, binary: 0x480 });
    }

    #[test]
    fn rejects_missing_signature_and_short_files() {
        let mut data = raw_header(&header_line(1, 2, "ts"), [(1, 1, 0), (2, 0, 0), (3, 0, 0)]);
        assert!(matches!(
            parse(&ByteReader::from_vec(data[..100].to_vec())),
            Err(RptError::Format(_))
        ));
        data[0] = b'X';
        assert!(matches!(parse(&ByteReader::from_vec(data)), Err(RptError::Format(_))));
    }

    #[test]
    fn rejects_zero_pages_and_bad_ids() {
        let data = raw_header(&header_line(1, 2, "ts"), [(1, 0, 0), (2, 0, 0), (3, 0, 0)]);
        assert!(parse(&ByteReader::from_vec(data)).is_err());

        let data = raw_header(b"RPTFILEHDR\tabc:12\tts\x1a", [(1, 1, 0), (2, 0, 0), (3, 0, 0)]);
        let err = parse(&ByteReader::from_vec(data)).unwrap_err();
        assert!(err.to_string().contains("domain"));
    }
}
