//! Low-level byte access utilities

use std::fs;
use std::ops::Range;
use std::path::Path;

use encoding_rs::Encoding;
use log::{debug, trace};

use super::types::error::{Result, RptError};

/// A whole container loaded into memory, with bounds-checked slicing.
#[derive(Debug, Clone)]
pub struct ByteReader {
    data: Vec<u8>,
}

impl ByteReader {
    /// Loads the file at `path` in one read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        debug!("Loaded {} ({} bytes)", path.display(), data.len());
        Ok(Self { data })
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns `len` bytes starting at `offset`, or `None` if any of them lie past the end.
    pub fn slice(&self, offset: u64, len: u64) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.data.get(start..end)
    }

    /// Like [`slice`](Self::slice), but reports the failure as a format error.
    pub fn require(&self, offset: u64, len: u64, what: &str) -> Result<&[u8]> {
        self.slice(offset, len).ok_or_else(|| {
            RptError::Format(format!(
                "{} at {:#x}..{:#x} lies beyond the end of a {}-byte file",
                what,
                offset,
                offset.saturating_add(len),
                self.data.len()
            ))
        })
    }

    /// True when `marker` is present exactly at `offset`.
    pub fn has_marker_at(&self, offset: usize, marker: &[u8]) -> bool {
        self.data
            .get(offset..)
            .is_some_and(|rest| rest.starts_with(marker))
    }

    /// First occurrence of `marker` inside `range` (clamped to the buffer)
    /// for which `accept` returns true.
    pub fn find_marker(
        &self,
        marker: &[u8],
        range: Range<usize>,
        accept: impl Fn(&[u8], usize) -> bool,
    ) -> Option<usize> {
        let end = range.end.min(self.data.len());
        let start = range.start.min(end);
        let found = self.data[start..end]
            .windows(marker.len())
            .enumerate()
            .map(|(i, _)| start + i)
            .find(|&pos| self.data[pos..].starts_with(marker) && accept(&self.data, pos));
        trace!(
            "Marker {:?} in {:#x}..{:#x}: {:?}",
            String::from_utf8_lossy(marker),
            start,
            end,
            found
        );
        found
    }
}

/// The range `half_width` bytes either side of `center`.
pub fn window_around(center: usize, half_width: usize) -> Range<usize> {
    center.saturating_sub(half_width)..center.saturating_add(half_width)
}

/// Resolves an encoding label, mapping GBK/GB2312 to GB18030.
///
/// Unknown labels fall back to UTF-8.
pub fn parse_encoding(label: &str) -> &'static Encoding {
    let label = label.trim();
    let normalized = if label.eq_ignore_ascii_case("GBK") || label.eq_ignore_ascii_case("GB2312") {
        "GB18030"
    } else {
        label
    };
    Encoding::for_label(normalized.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

/// Decodes page bytes with `encoding`, replacing malformed sequences.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!("Malformed {} sequences replaced while decoding page text", encoding.name());
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_rejects_out_of_bounds() {
        let reader = ByteReader::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(reader.slice(1, 2), Some(&[2u8, 3][..]));
        assert_eq!(reader.slice(3, 2), None);
        assert_eq!(reader.slice(u64::MAX, 1), None);
        assert!(reader.require(4, 1, "lookup").is_err());
    }

    #[test]
    fn find_marker_respects_range_and_predicate() {
        let reader = ByteReader::from_vec(b"xxBPAGETBLHDRyyPAGETBLHDR".to_vec());
        let any = reader.find_marker(b"PAGETBLHDR", 0..reader.len(), |_, _| true);
        assert_eq!(any, Some(3));
        let not_b = reader.find_marker(b"PAGETBLHDR", 0..reader.len(), |data, pos| {
            pos == 0 || data[pos - 1] != b'B'
        });
        assert_eq!(not_b, Some(15));
        assert_eq!(reader.find_marker(b"PAGETBLHDR", 0..10, |_, _| true), None);
    }

    #[test]
    fn encoding_labels() {
        assert_eq!(parse_encoding("gbk"), encoding_rs::GB18030);
        assert_eq!(parse_encoding("latin1"), encoding_rs::WINDOWS_1252);
        assert_eq!(parse_encoding("no-such-thing"), encoding_rs::UTF_8);
    }
}
