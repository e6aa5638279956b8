//! Page selection: all pages, a clamped range, or an ordered list of sections.

use log::warn;

use super::types::error::{Result, RptError};
use super::types::models::{Selection, SectionTable};

/// How many known section ids an unknown-section error lists.
const KNOWN_IDS_IN_ERROR: usize = 20;

/// Ordered page numbers chosen by a [`Selection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection {
    pub pages: Vec<u32>,
    /// Requested section ids that do not exist, in request order.
    pub skipped_sections: Vec<u32>,
}

/// Resolves `selection` against a container with `page_count` pages.
///
/// Ranges are clamped to `1..=page_count` but never reversed; a range that
/// is empty after clamping is an error. Section ids keep their request
/// order, and a repeated id repeats its pages.
pub fn select_pages(
    selection: &Selection,
    page_count: u32,
    sections: &SectionTable,
) -> Result<PageSelection> {
    match selection {
        Selection::All => Ok(PageSelection {
            pages: (1..=page_count).collect(),
            skipped_sections: Vec::new(),
        }),
        Selection::Range { start, end } => {
            let first = (*start).max(1);
            let last = (*end).min(page_count as i64);
            if first > last {
                return Err(RptError::NoPagesSelected(format!(
                    "range {}-{} is empty within pages 1-{}",
                    start, end, page_count
                )));
            }
            Ok(PageSelection {
                pages: (first as u32..=last as u32).collect(),
                skipped_sections: Vec::new(),
            })
        }
        Selection::Sections(ids) => select_sections(ids, sections),
    }
}

fn select_sections(ids: &[u32], sections: &SectionTable) -> Result<PageSelection> {
    let mut selection = PageSelection::default();
    let mut found_any = false;

    for &id in ids {
        match sections.find(id) {
            Some(section) => {
                found_any = true;
                selection.pages.extend(section.pages());
            }
            None => {
                warn!("Section {} not found; skipping", id);
                selection.skipped_sections.push(id);
            }
        }
    }

    if !found_any {
        let known: Vec<String> = sections
            .entries
            .iter()
            .take(KNOWN_IDS_IN_ERROR)
            .map(|s| s.section_id.to_string())
            .collect();
        let mut known = known.join(", ");
        if sections.entries.len() > KNOWN_IDS_IN_ERROR {
            known.push_str(&format!(" ... ({} total)", sections.entries.len()));
        }
        if known.is_empty() {
            known.push_str("none");
        }
        return Err(RptError::UnknownSections {
            requested: ids.to_vec(),
            known,
        });
    }
    Ok(selection)
}
