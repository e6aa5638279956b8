//! Read path: open a container, inflate pages, select and extract.

use std::fmt;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use log::{debug, info, warn};

use super::attachment::{self, AssembledAttachment};
use super::codec::compression;
use super::format::{binary_table, header, object_header, page_table, sections};
use super::select::{self, PageSelection};
use super::types::error::{Result, RptError};
use super::types::models::*;
use super::utils::{self, ByteReader};

/// Source of human-readable section names, keyed by `(species id, section id)`.
pub trait SectionNames {
    fn section_name(&self, species_id: u32, section_id: u32) -> Option<&str>;
}

/// A parsed report container held in memory.
///
/// Header and tables are parsed once on open; page records are inflated on
/// demand. One corrupt page never prevents access to the others.
#[derive(Debug)]
pub struct RptFile {
    source: PathBuf,
    data: ByteReader,
    header: ContainerHeader,
    pages: Vec<PageEntry>,
    sections: SectionTable,
    binary_objects: Vec<BinaryObjectEntry>,
}

/// One successfully extracted page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub bytes: Vec<u8>,
}

/// A page that could not be extracted.
#[derive(Debug)]
pub struct PageFailure {
    pub page_number: u32,
    pub error: RptError,
}

/// Outcome of a page extraction. Pages keep selection order.
#[derive(Debug, Default)]
pub struct Extraction {
    pub pages: Vec<ExtractedPage>,
    pub failures: Vec<PageFailure>,
    pub skipped_sections: Vec<u32>,
    /// Set when page 1 was an object header and was left out of the text output.
    pub excluded_object_header: bool,
}

/// Counts reported after an extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub selected: usize,
    pub extracted: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for ExtractionSummary {
    fn add_assign(&mut self, other: Self) {
        self.selected += other.selected;
        self.extracted += other.extracted;
        self.failed += other.failed;
    }
}

impl Extraction {
    pub fn summary(&self) -> ExtractionSummary {
        ExtractionSummary {
            selected: self.pages.len() + self.failures.len(),
            extracted: self.pages.len(),
            failed: self.failures.len(),
        }
    }

    /// Decodes every extracted page with `encoding`.
    pub fn texts(&self, encoding: &'static Encoding) -> Vec<(u32, String)> {
        self.pages
            .iter()
            .map(|p| (p.page_number, utils::decode_text(&p.bytes, encoding)))
            .collect()
    }
}

impl RptFile {
    /// Loads and parses the container at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening report container: {}", path.display());
        let data = ByteReader::load(path)?;
        Self::parse(path.to_path_buf(), data)
    }

    /// Parses a container already held in memory. `name` is used for
    /// messages and for naming an attachment without recorded file name.
    pub fn from_bytes(name: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self> {
        Self::parse(name.into(), ByteReader::from_vec(bytes))
    }

    fn parse(source: PathBuf, data: ByteReader) -> Result<Self> {
        let header = header::parse(&data)?;
        let page_table = page_table::parse(&data, &header)?;
        let sections = sections::parse(&data, &header)?;
        let binary_objects = binary_table::parse(&data, &header, page_table.end_offset)?;

        info!(
            "Container {} opened: {} pages, {} sections, {} attachment chunks",
            source.display(),
            page_table.entries.len(),
            sections.actual_count(),
            binary_objects.len()
        );

        Ok(Self {
            source,
            data,
            header,
            pages: page_table.entries,
            sections,
            binary_objects,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn pages(&self) -> &[PageEntry] {
        &self.pages
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    pub fn binary_objects(&self) -> &[BinaryObjectEntry] {
        &self.binary_objects
    }

    pub fn has_attachment(&self) -> bool {
        !self.binary_objects.is_empty()
    }

    /// Number of pages actually present in the page table.
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Inflates page `page_number` (1-based).
    pub fn read_page(&self, page_number: u32) -> Result<Vec<u8>> {
        let entry = page_number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .ok_or(RptError::PageOutOfRange {
                page: page_number,
                page_count: self.page_count(),
            })?;
        let label = format!("page {}", page_number);
        let payload = self
            .data
            .slice(entry.absolute_offset(), entry.compressed_size as u64)
            .ok_or_else(|| {
                RptError::decompression(
                    label.as_str(),
                    format!(
                        "{} bytes at {:#x} lie past the end of the file",
                        entry.compressed_size,
                        entry.absolute_offset()
                    ),
                )
            })?;
        compression::inflate(payload, entry.uncompressed_size, &label)
    }

    /// Inflates page `page_number` and decodes it with `encoding`.
    pub fn page_text(&self, page_number: u32, encoding: &'static Encoding) -> Result<String> {
        let bytes = self.read_page(page_number)?;
        Ok(utils::decode_text(&bytes, encoding))
    }

    fn read_chunk(&self, entry: &BinaryObjectEntry) -> Result<Vec<u8>> {
        let label = format!("attachment chunk {}", entry.index);
        let payload = self
            .data
            .slice(entry.absolute_offset(), entry.compressed_size as u64)
            .ok_or_else(|| {
                RptError::decompression(label.as_str(), "chunk lies past the end of the file")
            })?;
        compression::inflate(payload, entry.uncompressed_size, &label)
    }

    /// Metadata page describing the attachment, if the container has one.
    ///
    /// Returns `Ok(None)` for plain report containers, and also when page 1
    /// does not carry the object header prefix.
    pub fn object_header(&self) -> Result<Option<ObjectHeader>> {
        if !self.has_attachment() {
            return Ok(None);
        }
        let text = self.page_text(1, encoding_rs::UTF_8)?;
        let parsed = object_header::parse(&text);
        if parsed.is_none() {
            warn!("Container has attachment chunks but page 1 is not an object header");
        }
        Ok(parsed)
    }

    /// Page numbers chosen by `selection`, before object-header exclusion.
    pub fn select(&self, selection: &Selection) -> Result<PageSelection> {
        select::select_pages(selection, self.page_count(), &self.sections)
    }

    /// Extracts the text pages chosen by `selection`.
    ///
    /// Per-page decompression failures are collected in the result rather
    /// than returned. When the container carries an attachment, page 1 is the
    /// object header page and is left out.
    pub fn extract(&self, selection: &Selection) -> Result<Extraction> {
        let PageSelection {
            pages,
            skipped_sections,
        } = self.select(selection)?;

        // Page 1 of an attachment container is reserved even when it cannot be read.
        let object_header_page = self.has_attachment() && !matches!(self.object_header(), Ok(None));
        let mut extraction = Extraction {
            skipped_sections,
            ..Default::default()
        };

        for page_number in pages {
            if object_header_page && page_number == 1 {
                extraction.excluded_object_header = true;
                continue;
            }
            match self.read_page(page_number) {
                Ok(bytes) => extraction.pages.push(ExtractedPage { page_number, bytes }),
                // Sections of a truncated page table can name pages that are gone.
                Err(error) if error.is_recoverable() || matches!(error, RptError::PageOutOfRange { .. }) => {
                    warn!("{}: {}", self.source.display(), error);
                    extraction.failures.push(PageFailure { page_number, error });
                }
                Err(error) => return Err(error),
            }
        }

        if extraction.pages.is_empty() && extraction.failures.is_empty() {
            let reason = if extraction.excluded_object_header {
                "the selection contains only the object header page".to_string()
            } else {
                format!("the page table holds no readable entries ({} pages)", self.page_count())
            };
            return Err(RptError::NoPagesSelected(reason));
        }

        let summary = extraction.summary();
        debug!(
            "Extraction from {}: selected={}, extracted={}, failed={}",
            self.source.display(),
            summary.selected,
            summary.extracted,
            summary.failed
        );
        Ok(extraction)
    }

    /// Reassembles the embedded attachment. `Ok(None)` when there is none.
    pub fn assemble_attachment(&self) -> Result<Option<AssembledAttachment>> {
        if !self.has_attachment() {
            return Ok(None);
        }
        let metadata = match self.object_header() {
            Ok(metadata) => metadata,
            Err(e) if e.is_recoverable() => {
                warn!("Object header page unreadable, naming attachment from content: {}", e);
                None
            }
            Err(e) => return Err(e),
        };
        let chunks = self
            .binary_objects
            .iter()
            .map(|entry| (entry.index, self.read_chunk(entry)))
            .collect();
        let source_name = self
            .source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Ok(Some(attachment::assemble(chunks, metadata.as_ref(), source_name)))
    }

    /// Summary of header and tables, without inflating any text page.
    pub fn info(&self) -> ContainerInfo<'_> {
        ContainerInfo {
            file: self,
            names: None,
        }
    }
}

/// Printable overview of a container, as shown by the `info` command.
pub struct ContainerInfo<'a> {
    file: &'a RptFile,
    names: Option<&'a dyn SectionNames>,
}

impl<'a> ContainerInfo<'a> {
    /// Labels sections using `names`.
    pub fn with_section_names(mut self, names: &'a dyn SectionNames) -> Self {
        self.names = Some(names);
        self
    }
}

impl fmt::Display for ContainerInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file;
        let h = &file.header;
        writeln!(f, "File:        {}", file.source.display())?;
        writeln!(f, "Size:        {} bytes", file.data.len())?;
        writeln!(f, "Domain:      {}", h.domain_id)?;
        writeln!(f, "Species:     {}", h.species_id)?;
        writeln!(f, "Timestamp:   {}", h.timestamp)?;
        writeln!(f, "Pages:       {} (declared {})", file.page_count(), h.page_count)?;
        writeln!(
            f,
            "Sections:    {} (declared {})",
            file.sections.actual_count(),
            h.section_count
        )?;
        writeln!(
            f,
            "Attachment:  {}",
            if file.has_attachment() {
                format!("yes, {} chunks", file.binary_objects.len())
            } else {
                "none".to_string()
            }
        )?;

        if !file.sections.entries.is_empty() {
            writeln!(f)?;
            writeln!(f, "  {:>10}  {:>8}  {:>6}  Name", "Section", "Start", "Pages")?;
            for s in &file.sections.entries {
                let name = self
                    .names
                    .and_then(|n| n.section_name(h.species_id, s.section_id))
                    .unwrap_or("");
                writeln!(f, "  {:>10}  {:>8}  {:>6}  {}", s.section_id, s.start_page, s.page_count, name)?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "  {:>6}  {:>10}  {:>6}  {:>6}  {:>10}  {:>10}",
            "Page", "Offset", "Width", "Lines", "Size", "Packed"
        )?;
        for p in &file.pages {
            writeln!(
                f,
                "  {:>6}  {:>#10x}  {:>6}  {:>6}  {:>10}  {:>10}",
                p.page_number,
                p.absolute_offset(),
                p.line_width,
                p.lines_per_page,
                p.uncompressed_size,
                p.compressed_size
            )?;
        }

        if file.has_attachment() {
            writeln!(f)?;
            writeln!(f, "  {:>6}  {:>10}  {:>10}  {:>10}", "Chunk", "Offset", "Size", "Packed")?;
            for b in &file.binary_objects {
                writeln!(
                    f,
                    "  {:>6}  {:>#10x}  {:>10}  {:>10}",
                    b.index,
                    b.absolute_offset(),
                    b.uncompressed_size,
                    b.compressed_size
                )?;
            }
        }
        Ok(())
    }
}
