//! Core data structures for report container components.
//!
//! Every type here is an immutable view derived from the container bytes
//! (read path) or from caller-supplied content (write path).

use std::collections::BTreeMap;
use std::fmt;

use crate::rpt::layout::INSTANCE_BASE;

/// Location and population of one table, as declared by the table directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableLocation {
    /// Number of entries the directory claims.
    pub count: u32,
    /// Absolute offset of the table marker.
    pub offset: u32,
}

/// Offsets of the three tables, copied from the directory rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOffsets {
    pub page: u32,
    pub section: u32,
    pub binary: u32,
}

/// Parsed fixed header of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub domain_id: u32,
    pub species_id: u32,
    pub timestamp: String,
    pub page_count: u32,
    pub section_count: u32,
    pub binary_object_count: u32,
    pub table_offsets: TableOffsets,
}

/// One row of the page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    /// 1-based page number, assigned from table order.
    pub page_number: u32,
    pub relative_offset: u32,
    pub line_width: u16,
    pub lines_per_page: u16,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

impl PageEntry {
    pub fn absolute_offset(&self) -> u64 {
        self.relative_offset as u64 + INSTANCE_BASE as u64
    }
}

/// One section triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry {
    pub section_id: u32,
    /// 1-based first page.
    pub start_page: u32,
    pub page_count: u32,
}

impl SectionEntry {
    /// Last page of the section, inclusive.
    pub fn end_page(&self) -> u32 {
        self.start_page + self.page_count - 1
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.start_page..=self.end_page()
    }
}

/// Result of reading the section table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionTable {
    pub entries: Vec<SectionEntry>,
    /// Count declared in the table directory, which may disagree with `entries.len()`.
    pub declared_count: u32,
}

impl SectionTable {
    pub fn find(&self, section_id: u32) -> Option<&SectionEntry> {
        self.entries.iter().find(|s| s.section_id == section_id)
    }

    pub fn actual_count(&self) -> usize {
        self.entries.len()
    }
}

/// One row of the binary object table; each row is a compressed attachment chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryObjectEntry {
    /// 1-based chunk index, assigned from table order.
    pub index: u32,
    pub relative_offset: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

impl BinaryObjectEntry {
    pub fn absolute_offset(&self) -> u64 {
        self.relative_offset as u64 + INSTANCE_BASE as u64
    }
}

/// Metadata parsed from the object header page that precedes an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHeader {
    pub fields: BTreeMap<String, String>,
}

impl ObjectHeader {
    pub const FILE_NAME: &'static str = "Object File Name";
    pub const CREATION_DATE: &'static str = "Object Creation Date";
    pub const SIZE: &'static str = "Object Size";
    pub const PRODUCER: &'static str = "Producer";

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.get(Self::FILE_NAME).filter(|name| !name.is_empty())
    }
}

/// Format of an assembled attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    Pdf,
    Afp,
    /// Unrecognised content; the extension came from metadata or the generic fallback.
    Other(String),
}

impl AttachmentKind {
    pub fn extension(&self) -> &str {
        match self {
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Afp => "afp",
            AttachmentKind::Other(ext) => ext,
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentKind::Pdf => write!(f, "PDF"),
            AttachmentKind::Afp => write!(f, "AFP"),
            AttachmentKind::Other(ext) => write!(f, "binary (.{})", ext),
        }
    }
}

/// Which pages to pull out of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    /// Inclusive range; both ends are clamped to the container.
    Range { start: i64, end: i64 },
    /// Ordered section ids; repeats are honoured.
    Sections(Vec<u32>),
}

/// Which parts of a container an extraction should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentFilter {
    #[default]
    Everything,
    TextOnly,
    BinaryOnly,
}

impl ContentFilter {
    pub fn wants_text(self) -> bool {
        self != ContentFilter::BinaryOnly
    }

    pub fn wants_binary(self) -> bool {
        self != ContentFilter::TextOnly
    }
}
