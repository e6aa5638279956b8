//! Byte cursor used by the builder to emit a container front to back.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::layout::{
    TableKind, DATA_START, DIRECTORY_ROW_SIZE, INSTANCE_BASE, INSTANCE_MARKER,
    TABLE_DIRECTORY_OFFSET,
};
use super::types::error::{Result, RptError};

/// Append-only output buffer that tracks the running offset.
///
/// Offsets handed out by [`position`](Self::position) are always those of
/// bytes already emitted; only the fixed-size directory rows are patched
/// after the fact.
#[derive(Debug)]
pub struct ContainerWriter {
    buf: Vec<u8>,
}

impl ContainerWriter {
    /// Starts a container: the header line, the instance marker and a
    /// zeroed directory, positioned at the start of the data stream.
    pub fn with_header(header_line: &[u8]) -> Self {
        let mut buf = vec![0u8; DATA_START];
        buf[..header_line.len()].copy_from_slice(header_line);
        let base = INSTANCE_BASE as usize;
        buf[base..base + INSTANCE_MARKER.len()].copy_from_slice(INSTANCE_MARKER);
        Self { buf }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Current position as an absolute 32-bit file offset.
    pub fn offset(&self) -> Result<u32> {
        u32::try_from(self.buf.len())
            .map_err(|_| RptError::Validation("container would exceed 4 GiB".to_string()))
    }

    /// Current position relative to the instance header.
    pub fn relative_offset(&self) -> Result<u32> {
        Ok(self.offset()? - INSTANCE_BASE)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        // Writing into a Vec cannot fail.
        let _ = self.buf.write_u32::<LittleEndian>(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        let _ = self.buf.write_u16::<LittleEndian>(value);
    }

    /// Fills in one table directory row.
    pub fn patch_directory(&mut self, kind: TableKind, count: u32, offset: u32) {
        let row = TABLE_DIRECTORY_OFFSET + kind.row() * DIRECTORY_ROW_SIZE;
        let slot = &mut self.buf[row..row + DIRECTORY_ROW_SIZE];
        LittleEndian::write_u32(&mut slot[0..4], kind as u32);
        LittleEndian::write_u32(&mut slot[4..8], count);
        LittleEndian::write_u32(&mut slot[8..12], offset);
        LittleEndian::write_u32(&mut slot[12..16], 0);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_offsets_and_patches_directory() {
        let mut writer = ContainerWriter::with_header(b"RPTFILEHDR\t0001:2\tts\x1a");
        assert_eq!(writer.position(), DATA_START);
        assert_eq!(writer.relative_offset().unwrap(), DATA_START as u32 - INSTANCE_BASE);

        writer.write_u32(0xAABBCCDD);
        writer.write_u16(7);
        assert_eq!(writer.position(), DATA_START + 6);

        writer.patch_directory(TableKind::Section, 3, 0x1234);
        let bytes = writer.into_bytes();
        let row = TABLE_DIRECTORY_OFFSET + DIRECTORY_ROW_SIZE;
        assert_eq!(LittleEndian::read_u32(&bytes[row..]), 2);
        assert_eq!(LittleEndian::read_u32(&bytes[row + 4..]), 3);
        assert_eq!(LittleEndian::read_u32(&bytes[row + 8..]), 0x1234);
        assert_eq!(&bytes[DATA_START..DATA_START + 4], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert!(bytes[INSTANCE_BASE as usize..].starts_with(INSTANCE_MARKER));
    }
}
