use std::fs;
use std::path::Path;

use rpt_codec::rpt::batch;
use rpt_codec::rpt::layout::{
    BINARY_TABLE_MARKER, DATA_START, DIRECTORY_ROW_SIZE, PAGE_ENTRY_SIZE, PAGE_TABLE_MARKER,
    TABLE_DIRECTORY_OFFSET,
};
use rpt_codec::{BatchOptions, BuildOptions, RptBuilder, RptError, RptFile, Selection};

fn ten_page_container() -> Vec<u8> {
    RptBuilder::new(1, 52759)
        .timestamp("2024/03/01 08:15:00.000")
        .pages((1..=10).map(|n| format!("PAGE {n}\r\nTOTAL {:>8}\r\n", n * 100)))
        .build()
        .expect("builder should accept ten pages")
}

/// Overwrites the compressed bytes of `page_number` so they no longer inflate.
fn corrupt_page(bytes: &mut [u8], page_number: u32) {
    let file = RptFile::from_bytes("original.rpt", bytes.to_vec()).unwrap();
    let entry = file.pages()[page_number as usize - 1];
    let start = entry.absolute_offset() as usize;
    let end = start + entry.compressed_size as usize;
    bytes[start..end].fill(0xFF);
}

/// Four text pages in two sections plus a four-chunk PDF attachment.
fn attachment_container() -> (Vec<u8>, Vec<u8>) {
    let pdf: Vec<u8> = b"%PDF-1.5\n".iter().copied().chain((0..3000).map(|i| (i % 97) as u8)).collect();
    let bytes = RptBuilder::new(1, 52759)
        .timestamp("2024/03/01 08:15:00.000")
        .pages((1..=3).map(|n| format!("BRANCH PAGE {n}\r\n")))
        .section(14259, 1, 2)
        .section(68102, 3, 1)
        .attachment("statement.pdf", pdf.clone())
        .options(BuildOptions {
            chunk_size: 800,
            ..Default::default()
        })
        .build()
        .expect("builder should accept the request");
    (bytes, pdf)
}

/// Rewrites the absolute table offset stored in directory `row`.
fn set_directory_offset(bytes: &mut [u8], row: usize, offset: u32) {
    let at = TABLE_DIRECTORY_OFFSET + row * DIRECTORY_ROW_SIZE + 8;
    bytes[at..at + 4].copy_from_slice(&offset.to_le_bytes());
}

/// Defaces the first occurrence of `marker`.
fn rename_marker(bytes: &mut [u8], marker: &[u8]) {
    let pos = bytes
        .windows(marker.len())
        .position(|w| w == marker)
        .expect("marker present");
    bytes[pos] = b'X';
}

#[test]
fn wrong_directory_offsets_fall_back_to_scanning() {
    let (mut bytes, pdf) = attachment_container();
    for row in 0..3 {
        set_directory_offset(&mut bytes, row, DATA_START as u32);
    }

    let file = RptFile::from_bytes("misplaced.rpt", bytes).expect("tables are found by scanning");
    assert_eq!(file.page_count(), 4);
    assert_eq!(file.sections().entries.len(), 2);
    assert_eq!(file.binary_objects().len(), 4);

    let got: Vec<u32> = file
        .extract(&Selection::Sections(vec![68102]))
        .unwrap()
        .pages
        .iter()
        .map(|p| p.page_number)
        .collect();
    assert_eq!(got, vec![4]);
    let attachment = file.assemble_attachment().unwrap().unwrap();
    assert_eq!(attachment.bytes, pdf);
}

#[test]
fn page_table_offset_inside_binary_marker_is_rejected() {
    let (mut bytes, _) = attachment_container();
    let binary_table = RptFile::from_bytes("original.rpt", bytes.clone())
        .unwrap()
        .header()
        .table_offsets
        .binary;
    // Points at the "PAGETBLHDR" tail of "BPAGETBLHDR".
    set_directory_offset(&mut bytes, 0, binary_table + 1);

    let file = RptFile::from_bytes("misplaced.rpt", bytes).unwrap();
    assert_eq!(file.page_count(), 4, "the real page table should be found");
    assert_eq!(file.pages()[0].absolute_offset(), DATA_START as u64);
}

#[test]
fn missing_page_table_marker_is_a_table_error() {
    let mut bytes = ten_page_container();
    rename_marker(&mut bytes, PAGE_TABLE_MARKER);

    let err = RptFile::from_bytes("no_pages.rpt", bytes).unwrap_err();
    assert!(
        matches!(err, RptError::Table { table: "page", .. }),
        "got {:?}",
        err
    );
}

#[test]
fn missing_binary_table_marker_drops_the_attachment() {
    let (mut bytes, _) = attachment_container();
    rename_marker(&mut bytes, BINARY_TABLE_MARKER);

    let file = RptFile::from_bytes("no_chunks.rpt", bytes).expect("binary table is optional");
    assert!(file.binary_objects().is_empty());
    assert!(!file.has_attachment());
    assert!(file.assemble_attachment().unwrap().is_none());
    assert_eq!(file.page_count(), 4);
}

#[test]
fn empty_page_table_reports_no_readable_pages() {
    let mut bytes = ten_page_container();
    let page_table = RptFile::from_bytes("original.rpt", bytes.clone())
        .unwrap()
        .header()
        .table_offsets
        .page as usize;
    bytes.truncate(page_table + PAGE_TABLE_MARKER.len() + 5);

    let file = RptFile::from_bytes("empty.rpt", bytes).unwrap();
    assert_eq!(file.page_count(), 0);
    match file.extract(&Selection::All) {
        Err(RptError::NoPagesSelected(reason)) => {
            assert!(!reason.contains("object header"), "misleading reason: {}", reason);
            assert!(reason.contains("no readable entries"), "reason: {}", reason);
        }
        other => panic!("expected NoPagesSelected, got {:?}", other),
    }
}

#[test]
fn failed_persist_leaves_no_temporary_behind() {
    let dir = tempfile::tempdir().unwrap();
    // A non-empty directory where the container should go makes the final rename fail.
    let target = dir.path().join("out.rpt");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("keep"), b"x").unwrap();

    let err = RptBuilder::new(1, 1).page("p").write_to_path(&target).unwrap_err();
    assert!(matches!(err, RptError::Io(_)), "got {:?}", err);

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["out.rpt"], "temporary file should be removed");
}

#[test]
fn corrupt_page_is_skipped_and_reported() {
    let mut bytes = ten_page_container();
    corrupt_page(&mut bytes, 7);
    let file = RptFile::from_bytes("damaged.rpt", bytes).expect("tables are intact");

    let extraction = file.extract(&Selection::All).expect("other pages still extract");
    let numbers: Vec<u32> = extraction.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6, 8, 9, 10]);

    assert_eq!(extraction.failures.len(), 1);
    let failure = &extraction.failures[0];
    assert_eq!(failure.page_number, 7);
    assert!(
        matches!(failure.error, RptError::Decompression { .. }),
        "unexpected failure kind: {:?}",
        failure.error
    );

    let summary = extraction.summary();
    assert_eq!((summary.selected, summary.extracted, summary.failed), (10, 9, 1));
}

#[test]
fn info_does_not_inflate_pages() {
    let mut bytes = ten_page_container();
    for page in 1..=10 {
        corrupt_page(&mut bytes, page);
    }
    let file = RptFile::from_bytes("damaged.rpt", bytes).unwrap();
    assert!(file.read_page(1).is_err(), "pages should be unreadable");

    let info = file.info().to_string();
    assert!(info.contains("Species:     52759"), "info was:\n{}", info);
    assert!(info.contains("Pages:       10 (declared 10)"), "info was:\n{}", info);
    assert!(info.contains("Attachment:  none"), "info was:\n{}", info);
}

#[test]
fn truncated_page_table_yields_complete_entries() {
    let mut bytes = ten_page_container();
    let page_table = RptFile::from_bytes("original.rpt", bytes.clone())
        .unwrap()
        .header()
        .table_offsets
        .page as usize;
    // Three whole entries plus part of a fourth.
    bytes.truncate(page_table + PAGE_TABLE_MARKER.len() + 3 * PAGE_ENTRY_SIZE + 10);

    let file = RptFile::from_bytes("truncated.rpt", bytes).expect("truncation is tolerated");
    assert_eq!(file.header().page_count, 10);
    assert_eq!(file.page_count(), 3);

    let extraction = file.extract(&Selection::All).unwrap();
    assert_eq!(extraction.pages.len(), 3);
    assert!(extraction.failures.is_empty());
}

#[test]
fn missing_signature_is_a_format_error() {
    let mut bytes = ten_page_container();
    bytes[..4].copy_from_slice(b"JUNK");
    let err = RptFile::from_bytes("bad.rpt", bytes).unwrap_err();
    assert!(matches!(err, RptError::Format(_)), "got {:?}", err);

    let err = RptFile::from_bytes("tiny.rpt", b"RPTFILEHDR".to_vec()).unwrap_err();
    assert!(matches!(err, RptError::Format(_)), "got {:?}", err);
}

#[test]
fn out_of_range_page_read() {
    let file = RptFile::from_bytes("ok.rpt", ten_page_container()).unwrap();
    for page in [0, 11] {
        match file.read_page(page) {
            Err(RptError::PageOutOfRange { page: p, page_count }) => {
                assert_eq!((p, page_count), (page, 10));
            }
            other => panic!("page {} should be out of range, got {:?}", page, other),
        }
    }
}

#[test]
fn corrupt_attachment_chunk_leaves_attachment_incomplete() {
    let bytes = RptBuilder::new(1, 1)
        .page("cover")
        .attachment("doc.pdf", b"%PDF-1.7 ".repeat(300))
        .options(BuildOptions {
            chunk_size: 512,
            ..Default::default()
        })
        .build()
        .unwrap();
    let mut damaged = bytes.clone();
    let chunk = RptFile::from_bytes("original.rpt", bytes).unwrap().binary_objects()[1];
    let start = chunk.absolute_offset() as usize;
    damaged[start..start + chunk.compressed_size as usize].fill(0);

    let file = RptFile::from_bytes("damaged.rpt", damaged).unwrap();
    let attachment = file.assemble_attachment().unwrap().unwrap();
    assert!(!attachment.is_complete());
    assert_eq!(attachment.failures.len(), 1);
    assert_eq!(attachment.failures[0].index, chunk.index);
    assert_eq!(attachment.chunk_count, file.binary_objects().len());

    // Text pages are unaffected by a broken chunk.
    let texts = file.extract(&Selection::All).unwrap().texts(encoding_rs::UTF_8);
    assert_eq!(texts, vec![(2, "cover".to_string())]);
}

#[test]
fn batch_continues_past_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("good.rpt"), ten_page_container()).unwrap();
    fs::write(dir.path().join("bad.RPT"), b"not a container at all").unwrap();
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let paths = batch::discover(dir.path()).unwrap();
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["bad.RPT", "good.rpt"]);

    let options = BatchOptions {
        workers: 2,
        ..Default::default()
    };
    let items = batch::run(&paths, &options, |path: &Path| {
        RptFile::open(path).map(|file| file.page_count())
    });

    assert!(matches!(items[0].result, Err(RptError::Format(_))));
    assert_eq!(items[1].result.as_ref().ok(), Some(&10));
}

#[test]
fn path_lists_resolve_relative_entries() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("inputs.lst");
    fs::write(&list, "# nightly run\na.rpt\n\n/abs/b.rpt\n").unwrap();

    let paths = batch::read_path_list(&list).unwrap();
    assert_eq!(paths, vec![dir.path().join("a.rpt"), Path::new("/abs/b.rpt").to_path_buf()]);
}
