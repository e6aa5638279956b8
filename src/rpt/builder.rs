//! Container builder: the inverse of [`RptFile`](super::reader::RptFile).
//!
//! Output layout, in emission order:
//!
//! ```text
//! header + instance marker + directory (patched last)
//! page 1 stream, chunk 1 stream, page 2 stream, chunk 2 stream, ...
//! SECTIONHDR triplets ENDDATA
//! PAGETBLHDR entries
//! BPAGETBLHDR entries        (only with an attachment)
//! ```
//!
//! Every request is validated before a single byte is produced.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use encoding_rs::Encoding;
use flate2::Compression;
use log::{debug, info, trace, warn};

use super::codec::compression;
use super::format::{header, object_header};
use super::layout::{
    TableKind, BINARY_TABLE_MARKER, DEFAULT_CHUNK_SIZE, INSTANCE_BASE, PAGE_TABLE_MARKER,
    SECTION_MARKER, SECTION_SENTINEL,
};
use super::types::error::{Result, RptError};
use super::types::models::ObjectHeader;
use super::writer::ContainerWriter;

/// A section as supplied by the caller, numbered over the caller's text pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub section_id: u32,
    pub start_page: u32,
    pub page_count: u32,
}

/// The single binary document a container may embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInput {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Tunables for the builder.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Largest attachment chunk before compression.
    pub chunk_size: usize,
    pub compression: Compression,
    /// Encoding applied to page text.
    pub encoding: &'static Encoding,
    /// Value of the object header's `Producer` field.
    pub producer: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: Compression::default(),
            encoding: encoding_rs::UTF_8,
            producer: concat!("rpt-codec ", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Assembles a report container from page text, sections and an optional attachment.
#[derive(Debug, Clone)]
pub struct RptBuilder {
    domain_id: u32,
    species_id: u32,
    timestamp: Option<String>,
    pages: Vec<String>,
    sections: Vec<SectionSpec>,
    attachment: Option<AttachmentInput>,
    options: BuildOptions,
}

/// One compressed record and its table bookkeeping.
struct Record {
    relative_offset: u32,
    uncompressed_size: u32,
    compressed_size: u32,
}

/// Everything needed to emit, after validation.
struct Plan {
    pages: Vec<PlannedPage>,
    sections: Vec<SectionSpec>,
    chunks: Vec<Vec<u8>>,
}

struct PlannedPage {
    bytes: Vec<u8>,
    line_width: u16,
    lines_per_page: u16,
}

impl RptBuilder {
    pub fn new(domain_id: u32, species_id: u32) -> Self {
        Self {
            domain_id,
            species_id,
            timestamp: None,
            pages: Vec::new(),
            sections: Vec::new(),
            attachment: None,
            options: BuildOptions::default(),
        }
    }

    /// Header timestamp. Defaults to the local time at build.
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn page(mut self, text: impl Into<String>) -> Self {
        self.pages.push(text.into());
        self
    }

    pub fn pages<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages.extend(texts.into_iter().map(Into::into));
        self
    }

    pub fn section(mut self, section_id: u32, start_page: u32, page_count: u32) -> Self {
        self.sections.push(SectionSpec {
            section_id,
            start_page,
            page_count,
        });
        self
    }

    pub fn sections(mut self, sections: impl IntoIterator<Item = SectionSpec>) -> Self {
        self.sections.extend(sections);
        self
    }

    pub fn attachment(mut self, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachment = Some(AttachmentInput {
            file_name: file_name.into(),
            bytes,
        });
        self
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the request and returns the container bytes.
    pub fn build(&self) -> Result<Vec<u8>> {
        let timestamp = self.timestamp.clone().unwrap_or_else(|| {
            chrono::Local::now().format("%Y/%m/%d %H:%M:%S%.3f").to_string()
        });
        reject_control_chars("timestamp", &timestamp)?;
        let header_line = header::header_line(self.domain_id, self.species_id, &timestamp);
        if header_line.len() > INSTANCE_BASE as usize {
            return Err(RptError::Validation(format!(
                "header line is {} bytes; at most {} fit before the instance header",
                header_line.len(),
                INSTANCE_BASE
            )));
        }

        let plan = self.plan(&timestamp)?;
        info!(
            "Building container: {} pages, {} sections, {} attachment chunks",
            plan.pages.len(),
            plan.sections.len(),
            plan.chunks.len()
        );
        self.emit(&header_line, plan)
    }

    /// Builds in memory, writes a `.partial` temporary next to `path` and
    /// renames it into place. The temporary is removed on any failure.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.build()?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let prefix = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "container".into());
        let mut partial = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".partial")
            .tempfile_in(dir)?;
        partial.write_all(&bytes)?;
        partial.as_file().sync_all()?;
        partial.persist(path).map_err(|e| e.error)?;

        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn plan(&self, timestamp: &str) -> Result<Plan> {
        if self.pages.is_empty() && self.attachment.is_none() {
            return Err(RptError::Validation(
                "a container needs at least one page or an attachment".to_string(),
            ));
        }
        validate_sections(&self.sections, self.pages.len())?;
        if self.options.chunk_size == 0 {
            return Err(RptError::Validation("chunk size must be positive".to_string()));
        }

        let mut pages = Vec::with_capacity(self.pages.len() + 1);
        let mut chunks = Vec::new();
        // Container page numbers shift by one when page 1 is the object header.
        let mut shift = 0;

        if let Some(attachment) = &self.attachment {
            reject_control_chars("attachment file name", &attachment.file_name)?;
            reject_control_chars("producer", &self.options.producer)?;
            let header_page = object_header::render([
                (ObjectHeader::FILE_NAME, attachment.file_name.clone()),
                (ObjectHeader::CREATION_DATE, timestamp.to_string()),
                (ObjectHeader::SIZE, attachment.bytes.len().to_string()),
                (ObjectHeader::PRODUCER, self.options.producer.clone()),
            ]);
            pages.push(plan_page(&header_page, header_page.as_bytes().to_vec()));
            shift = 1;

            chunks = attachment
                .bytes
                .chunks(self.options.chunk_size)
                .map(<[u8]>::to_vec)
                .collect();
            if chunks.is_empty() {
                chunks.push(Vec::new());
            }
        }

        for (i, text) in self.pages.iter().enumerate() {
            let (encoded, _, unmappable) = self.options.encoding.encode(text);
            if unmappable {
                warn!(
                    "Page {} has characters not representable in {}; they were escaped",
                    i + 1,
                    self.options.encoding.name()
                );
            }
            pages.push(plan_page(text, encoded.into_owned()));
        }

        let page_total = u32::try_from(pages.len())
            .map_err(|_| RptError::Validation("too many pages".to_string()))?;
        let sections = if self.sections.is_empty() {
            vec![SectionSpec {
                section_id: 0,
                start_page: 1,
                page_count: page_total,
            }]
        } else {
            self.sections
                .iter()
                .map(|s| SectionSpec {
                    start_page: s.start_page + shift,
                    ..*s
                })
                .collect()
        };

        Ok(Plan {
            pages,
            sections,
            chunks,
        })
    }

    fn emit(&self, header_line: &[u8], plan: Plan) -> Result<Vec<u8>> {
        let level = self.options.compression;
        let mut writer = ContainerWriter::with_header(header_line);
        let mut page_records = Vec::with_capacity(plan.pages.len());
        let mut chunk_records = Vec::with_capacity(plan.chunks.len());
        let mut chunks = plan.chunks.iter();

        for (i, page) in plan.pages.iter().enumerate() {
            page_records.push(write_record(&mut writer, &page.bytes, level)?);
            trace!("Page {} written at {:#x}", i + 1, writer.position());
            if let Some(chunk) = chunks.next() {
                chunk_records.push(write_record(&mut writer, chunk, level)?);
            }
        }
        for chunk in chunks {
            chunk_records.push(write_record(&mut writer, chunk, level)?);
        }

        let section_offset = writer.offset()?;
        writer.write_bytes(SECTION_MARKER);
        for s in &plan.sections {
            writer.write_u32(s.section_id);
            writer.write_u32(s.start_page);
            writer.write_u32(s.page_count);
        }
        writer.write_bytes(SECTION_SENTINEL);
        writer.write_bytes(&[0]);

        let page_offset = writer.offset()?;
        writer.write_bytes(PAGE_TABLE_MARKER);
        for (page, record) in plan.pages.iter().zip(&page_records) {
            writer.write_u32(record.relative_offset);
            writer.write_u32(0);
            writer.write_u16(page.line_width);
            writer.write_u16(page.lines_per_page);
            writer.write_u32(record.uncompressed_size);
            writer.write_u32(record.compressed_size);
            writer.write_u32(0);
        }

        let binary_offset = if chunk_records.is_empty() {
            0
        } else {
            let offset = writer.offset()?;
            writer.write_bytes(BINARY_TABLE_MARKER);
            for record in &chunk_records {
                writer.write_u32(record.relative_offset);
                writer.write_u32(0);
                writer.write_u32(record.uncompressed_size);
                writer.write_u32(record.compressed_size);
            }
            offset
        };
        // The finished file must stay addressable by 32-bit offsets.
        writer.offset()?;

        writer.patch_directory(TableKind::Page, page_records.len() as u32, page_offset);
        writer.patch_directory(TableKind::Section, plan.sections.len() as u32, section_offset);
        writer.patch_directory(TableKind::Binary, chunk_records.len() as u32, binary_offset);

        debug!(
            "Tables at: sections {:#x}, pages {:#x}, binary {:#x}",
            section_offset, page_offset, binary_offset
        );
        Ok(writer.into_bytes())
    }
}

fn write_record(writer: &mut ContainerWriter, data: &[u8], level: Compression) -> Result<Record> {
    let uncompressed_size = u32::try_from(data.len())
        .map_err(|_| RptError::Validation("record larger than 4 GiB".to_string()))?;
    let packed = compression::deflate(data, level)?;
    let relative_offset = writer.relative_offset()?;
    writer.write_bytes(&packed);
    Ok(Record {
        relative_offset,
        uncompressed_size,
        compressed_size: packed.len() as u32,
    })
}

fn plan_page(text: &str, bytes: Vec<u8>) -> PlannedPage {
    let lines: Vec<&str> = text.lines().collect();
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    PlannedPage {
        bytes,
        line_width: u16::try_from(width).unwrap_or(u16::MAX),
        lines_per_page: u16::try_from(lines.len()).unwrap_or(u16::MAX),
    }
}

/// Header and object header fields are delimited by tabs, line breaks and
/// 0x1A, so none of those may appear inside a value.
fn reject_control_chars(what: &str, value: &str) -> Result<()> {
    match value.chars().find(|c| c.is_control()) {
        Some(c) => Err(RptError::Validation(format!(
            "{} {:?} contains control character {:?}",
            what, value, c
        ))),
        None => Ok(()),
    }
}

/// Sections must tile `1..=page_count` exactly, in order, with unique ids.
fn validate_sections(sections: &[SectionSpec], page_count: usize) -> Result<()> {
    if sections.is_empty() {
        return Ok(());
    }

    let mut seen = HashSet::new();
    let mut next_start: u64 = 1;
    for s in sections {
        if !seen.insert(s.section_id) {
            return Err(RptError::Validation(format!(
                "section id {} appears more than once",
                s.section_id
            )));
        }
        if s.page_count == 0 {
            return Err(RptError::Validation(format!(
                "section {} has no pages",
                s.section_id
            )));
        }
        if (s.start_page as u64) != next_start {
            let problem = if (s.start_page as u64) > next_start { "gap" } else { "overlap" };
            return Err(RptError::Validation(format!(
                "section {} starts at page {}, expected {} ({} between sections)",
                s.section_id, s.start_page, next_start, problem
            )));
        }
        next_start += s.page_count as u64;
    }

    let covered = next_start - 1;
    if covered != page_count as u64 {
        return Err(RptError::Validation(format!(
            "sections cover {} pages but {} page texts were supplied",
            covered, page_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(section_id: u32, start_page: u32, page_count: u32) -> SectionSpec {
        SectionSpec {
            section_id,
            start_page,
            page_count,
        }
    }

    #[test]
    fn accepts_contiguous_sections() {
        assert!(validate_sections(&[spec(1, 1, 2), spec(2, 3, 1)], 3).is_ok());
        assert!(validate_sections(&[], 5).is_ok());
    }

    #[test]
    fn rejects_bad_sections() {
        let cases: &[(&[SectionSpec], usize, &str)] = &[
            (&[spec(1, 1, 2)], 3, "cover 2 pages"),
            (&[spec(1, 1, 4)], 3, "cover 4 pages"),
            (&[spec(1, 1, 1), spec(2, 3, 1)], 3, "gap"),
            (&[spec(1, 1, 2), spec(2, 2, 1)], 3, "overlap"),
            (&[spec(1, 2, 2)], 3, "gap"),
            (&[spec(1, 1, 1), spec(1, 2, 1)], 2, "more than once"),
            (&[spec(1, 1, 0)], 0, "no pages"),
        ];
        for (sections, pages, needle) in cases {
            let err = validate_sections(sections, *pages).unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "expected {:?} in {:?}",
                needle,
                err.to_string()
            );
        }
    }

    #[test]
    fn line_metrics() {
        let page = plan_page("ab\ncdef\n\nx", Vec::new());
        assert_eq!(page.line_width, 4);
        assert_eq!(page.lines_per_page, 4);
    }

    #[test]
    fn empty_request_is_rejected() {
        let err = RptBuilder::new(1, 1).build().unwrap_err();
        assert!(matches!(err, RptError::Validation(_)));
    }

    #[test]
    fn delimiters_inside_fields_are_rejected() {
        for timestamp in ["a\tb", "2024/01/01\r\n", "ts\u{1a}"] {
            let err = RptBuilder::new(1, 1).timestamp(timestamp).page("p").build().unwrap_err();
            assert!(
                matches!(err, RptError::Validation(_)),
                "timestamp {:?} should be rejected, got {:?}",
                timestamp,
                err
            );
        }

        let err = RptBuilder::new(1, 1)
            .attachment("doc.pdf\r\nProducer: forged", b"%PDF".to_vec())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("attachment file name"), "got {}", err);
    }

    #[test]
    fn overlong_timestamp_is_rejected() {
        let err = RptBuilder::new(1, 1)
            .timestamp("x".repeat(300))
            .page("p")
            .build()
            .unwrap_err();
        assert!(matches!(err, RptError::Validation(_)));
    }
}
