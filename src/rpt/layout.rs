//! Fixed offsets, sizes and markers of the report container layout.
//!
//! ```text
//! 0x000 ┌──────────────────────────────┐
//!       │ RPTFILEHDR\tDDDD:SSSS\tTS 0x1A│ ← format::header
//! 0x0F0 ├──────────────────────────────┤
//!       │ RPTINSTHDR (offset base)     │
//! 0x1F0 ├──────────────────────────────┤
//!       │ table directory (3 x 16)     │
//! 0x220 ├──────────────────────────────┤
//!       │ zlib page / chunk stream     │ ← codec::compression
//!       ├──────────────────────────────┤
//!       │ SECTIONHDR triplets ENDDATA  │ ← format::sections
//!       │ PAGETBLHDR entries           │ ← format::page_table
//!       │ BPAGETBLHDR entries          │ ← format::binary_table
//!       └──────────────────────────────┘
//! ```

/// Leading signature of every container.
pub const FILE_SIGNATURE: &[u8] = b"RPTFILEHDR";

/// Byte terminating the tab-delimited header line.
pub const HEADER_TERMINATOR: u8 = 0x1A;

/// Offset of the instance header. Page and chunk offsets are relative to it.
pub const INSTANCE_BASE: u32 = 0xF0;

pub const INSTANCE_MARKER: &[u8] = b"RPTINSTHDR";

/// Offset of the three-row table directory.
pub const TABLE_DIRECTORY_OFFSET: usize = 0x1F0;
pub const DIRECTORY_ROW_SIZE: usize = 16;
pub const DIRECTORY_ROWS: usize = 3;

/// First byte of the compressed stream, and the smallest valid file size.
pub const DATA_START: usize = TABLE_DIRECTORY_OFFSET + DIRECTORY_ROW_SIZE * DIRECTORY_ROWS;
pub const MIN_HEADER_SIZE: usize = DATA_START;

pub const SECTION_MARKER: &[u8] = b"SECTIONHDR";
pub const SECTION_SENTINEL: &[u8] = b"ENDDATA";
pub const SECTION_ENTRY_SIZE: usize = 12;

pub const PAGE_TABLE_MARKER: &[u8] = b"PAGETBLHDR";
pub const PAGE_ENTRY_SIZE: usize = 24;

pub const BINARY_TABLE_MARKER: &[u8] = b"BPAGETBLHDR";
pub const BINARY_ENTRY_SIZE: usize = 16;

/// Half-width of the window searched around an expected table offset.
pub const SCAN_WINDOW: usize = 4096;

/// Default size of one attachment chunk before compression.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Directory row type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TableKind {
    Page = 1,
    Section = 2,
    Binary = 3,
}

impl TableKind {
    pub fn row(self) -> usize {
        self as usize - 1
    }

    pub fn name(self) -> &'static str {
        match self {
            TableKind::Page => "page",
            TableKind::Section => "section",
            TableKind::Binary => "binary object",
        }
    }
}
