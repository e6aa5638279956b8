//! Attachment format detection by content signature.

use std::path::Path;

use crate::rpt::types::models::AttachmentKind;

const PDF_SIGNATURE: &[u8] = b"%PDF";
/// Structured-field introducer that opens every AFP record.
const AFP_INTRODUCER: u8 = 0x5A;

const GENERIC_EXTENSION: &str = "bin";

/// Classifies `bytes` by leading signature, falling back to the extension of
/// `recorded_name` and finally to a generic binary extension.
pub fn classify(bytes: &[u8], recorded_name: Option<&str>) -> AttachmentKind {
    if bytes.starts_with(PDF_SIGNATURE) {
        return AttachmentKind::Pdf;
    }
    if bytes.first() == Some(&AFP_INTRODUCER) {
        return AttachmentKind::Afp;
    }

    let extension = recorded_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("pdf") => AttachmentKind::Pdf,
        Some("afp") => AttachmentKind::Afp,
        Some(ext) => AttachmentKind::Other(ext.to_string()),
        None => AttachmentKind::Other(GENERIC_EXTENSION.to_string()),
    }
}
