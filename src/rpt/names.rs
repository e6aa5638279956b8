//! Section name lookup loaded from an external `species,section,name` resource.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};

use super::reader::SectionNames;
use super::types::error::Result;

/// In-memory `(species id, section id) -> name` table.
#[derive(Debug, Clone, Default)]
pub struct SectionNameTable {
    names: HashMap<(u32, u32), String>,
}

impl SectionNameTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let table = Self::parse(&text);
        debug!("Loaded {} section names from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parses comma-separated lines. Blank lines and `#` comments are ignored;
    /// a non-numeric first line is treated as a column header.
    pub fn parse(text: &str) -> Self {
        let mut names = HashMap::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, ',').map(str::trim);
            let species = fields.next().and_then(|f| f.parse::<u32>().ok());
            let section = fields.next().and_then(|f| f.parse::<u32>().ok());
            let name = fields.next().map(|f| f.trim_matches('"'));
            match (species, section, name) {
                (Some(species), Some(section), Some(name)) => {
                    names.insert((species, section), name.to_string());
                }
                _ if n == 0 => {}
                _ => warn!("Ignoring malformed section name line {}: {:?}", n + 1, line),
            }
        }
        Self { names }
    }

    pub fn insert(&mut self, species_id: u32, section_id: u32, name: impl Into<String>) {
        self.names.insert((species_id, section_id), name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl SectionNames for SectionNameTable {
    fn section_name(&self, species_id: u32, section_id: u32) -> Option<&str> {
        self.names.get(&(species_id, section_id)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_skips_noise() {
        let table = SectionNameTable::parse(
            "species,section,name\n\
             # branch names\n\
             52759,14259,\"Head Office, Main\"\n\
             \n\
             52759,68102,Branch 014\n\
             bogus line\n",
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.section_name(52759, 14259), Some("Head Office, Main"));
        assert_eq!(table.section_name(52759, 68102), Some("Branch 014"));
        assert_eq!(table.section_name(1, 14259), None);
    }
}
