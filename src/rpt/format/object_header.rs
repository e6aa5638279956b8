//! The object header page that precedes an embedded attachment.
//!
//! When a container carries an attachment, page 1 is not report text but a
//! small `Key: Value` block describing the attachment:
//!
//! ```text
//! StorQM PLUS Object Header Page:
//! Object File Name: scan_0001.pdf
//! Object Creation Date: 2024/01/15 10:30:45.000
//! ```

use std::collections::BTreeMap;

use log::trace;

use crate::rpt::types::models::ObjectHeader;

/// First line of every object header page.
pub const OBJECT_HEADER_PREFIX: &str = "StorQM PLUS Object Header Page:";

/// Parses decompressed page text. Returns `None` when the page is ordinary report text.
pub fn parse(text: &str) -> Option<ObjectHeader> {
    let body = text.trim_start_matches('\u{feff}').strip_prefix(OBJECT_HEADER_PREFIX)?;

    let fields: BTreeMap<String, String> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    trace!("Object header page with {} fields", fields.len());
    Some(ObjectHeader { fields })
}

/// Renders an object header page from ordered `(key, value)` pairs.
pub fn render<'a>(fields: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut page = String::from(OBJECT_HEADER_PREFIX);
    page.push_str("\r\n");
    for (key, value) in fields {
        page.push_str(key);
        page.push_str(": ");
        page.push_str(&value);
        page.push_str("\r\n");
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let text = "StorQM PLUS Object Header Page:\r\n\
                    Object File Name: scan_0001.pdf\r\n\
                    \r\n\
                    Object Creation Date: 2024/01/15 10:30:45.000\r\n\
                    no colon here\r\n";
        let header = parse(text).expect("object header");
        assert_eq!(header.file_name(), Some("scan_0001.pdf"));
        assert_eq!(
            header.get(ObjectHeader::CREATION_DATE),
            Some("2024/01/15 10:30:45.000")
        );
        assert_eq!(header.fields.len(), 2);
    }

    #[test]
    fn ordinary_text_is_not_an_object_header() {
        assert!(parse("ACCOUNT STATEMENT\nObject File Name: nope\n").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn render_then_parse_keeps_fields() {
        let page = render([
            (ObjectHeader::FILE_NAME, "a.pdf".to_string()),
            (ObjectHeader::SIZE, "12".to_string()),
        ]);
        let header = parse(&page).unwrap();
        assert_eq!(header.get(ObjectHeader::SIZE), Some("12"));
    }
}
