//! # rpt-codec
//!
//! Reader and builder for legacy compressed report containers (`.rpt`).
//!
//! A container holds zlib-compressed report pages, a page table, a section
//! table grouping pages into named runs, and optionally one embedded binary
//! attachment (PDF or AFP) split across compressed chunks.
pub mod rpt;

// Re-export the main types for convenience
pub use rpt::{
    attachment::AssembledAttachment,
    batch::{BatchOptions, CancelToken},
    names::SectionNameTable,
    types::models::{
        AttachmentKind, BinaryObjectEntry, ContainerHeader, ContentFilter, ObjectHeader,
        PageEntry, SectionEntry, SectionTable, Selection,
    },
    AttachmentInput, BuildOptions, Extraction, ExtractionSummary, Result, RptBuilder, RptError,
    RptFile, SectionNames, SectionSpec,
};
