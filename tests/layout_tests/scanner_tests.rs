//! Tests for RecordScanner

use flashrec::backend::{FlashBackend, Geometry, MemoryFlash};
use flashrec::layout::{
    encode_record, Format, PageHeader, PageState, RecordKey, RecordScanner, RecordState,
    ScannedRecord, RECORD_STATE_OFFSET,
};

// =============================================================================
// Helper Functions
// =============================================================================

const PAGE_SIZE: usize = 256;

fn setup() -> (MemoryFlash, Format) {
    let flash = MemoryFlash::new(Geometry::new(PAGE_SIZE, 2, 4));
    (flash, Format::new(PAGE_SIZE, 4))
}

/// Write a page header followed by records, returning each record's offset
fn write_page(
    flash: &mut MemoryFlash,
    format: &Format,
    page: u32,
    records: &[(u16, u32, &str)],
) -> Vec<usize> {
    flash
        .program(page, 0, &PageHeader::new(1, PageState::Data).encode(format))
        .unwrap();

    let mut offset = format.data_start();
    let mut offsets = Vec::new();
    for &(key, sequence, data) in records {
        let encoded = encode_record(format, RecordKey::new(1, key), sequence, data.as_bytes());
        flash.program(page, offset, &encoded).unwrap();
        offsets.push(offset);
        offset += encoded.len();
    }
    offsets
}

fn scan(flash: &mut MemoryFlash, format: Format, page: u32) -> (Vec<ScannedRecord>, usize) {
    let mut scanner = RecordScanner::new(flash, format, page);
    let records: Vec<ScannedRecord> = scanner.by_ref().map(|r| r.unwrap()).collect();
    (records, scanner.end_offset())
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_empty_page() {
    let (mut flash, format) = setup();
    write_page(&mut flash, &format, 0, &[]);

    let (records, end) = scan(&mut flash, format, 0);

    assert!(records.is_empty());
    assert_eq!(end, format.data_start());
}

#[test]
fn test_scan_in_write_order() {
    let (mut flash, format) = setup();
    let offsets = write_page(
        &mut flash,
        &format,
        1,
        &[(1, 1, "one"), (2, 2, ""), (1, 3, "uno, again")],
    );

    let (records, end) = scan(&mut flash, format, 1);

    assert_eq!(records.len(), 3);
    let found: Vec<usize> = records.iter().map(|r| r.offset).collect();
    assert_eq!(found, offsets);
    assert_eq!(records[0].header.key, RecordKey::new(1, 1));
    assert_eq!(records[1].footprint, format.footprint(0));
    assert_eq!(records[2].header.sequence, 3);
    assert!(records.iter().all(|r| r.intact));
    assert_eq!(end, offsets[2] + format.footprint(10));
}

#[test]
fn test_scan_reports_states() {
    let (mut flash, format) = setup();
    let offsets = write_page(&mut flash, &format, 0, &[(1, 1, "a"), (2, 2, "b")]);

    // Tombstone the first record in place
    let mut word = [0x5A, 0xFE, 0xFF, 0xFF];
    word[RECORD_STATE_OFFSET] &= RecordState::Tombstoned.as_byte();
    flash.program(0, offsets[0], &word).unwrap();

    let (records, _) = scan(&mut flash, format, 0);

    assert_eq!(records[0].header.state, RecordState::Tombstoned);
    assert!(records[0].intact);
    assert_eq!(records[1].header.state, RecordState::Live);
}

#[test]
fn test_scan_flags_bad_crc() {
    let (mut flash, format) = setup();
    let offsets = write_page(&mut flash, &format, 0, &[(1, 1, "abcd"), (2, 2, "ok")]);

    // Flip payload bits of the first record
    flash.program(0, offsets[0] + 20, &[0x00, 0x00, 0x00, 0x00]).unwrap();

    let (records, end) = scan(&mut flash, format, 0);

    assert_eq!(records.len(), 2);
    assert!(!records[0].intact);
    assert!(records[1].intact);
    assert_eq!(end, offsets[1] + format.footprint(2));
}

#[test]
fn test_scan_stops_at_garbled_header() {
    let (mut flash, format) = setup();
    let offsets = write_page(&mut flash, &format, 0, &[(1, 1, "x")]);
    let garbage_at = offsets[0] + format.footprint(1);
    flash.program(0, garbage_at, &[0x00, 0x00, 0x00, 0x00]).unwrap();

    let (records, end) = scan(&mut flash, format, 0);

    assert_eq!(records.len(), 1);
    assert_eq!(end, PAGE_SIZE);
}

#[test]
fn test_scan_stops_at_oversized_length() {
    let (mut flash, format) = setup();
    write_page(&mut flash, &format, 0, &[]);

    // A header whose length runs past the page end
    let mut bogus = encode_record(&format, RecordKey::new(1, 1), 1, b"");
    bogus[8] = 0x00;
    bogus[9] = 0x10;
    flash.program(0, format.data_start(), &bogus).unwrap();

    let (records, end) = scan(&mut flash, format, 0);

    assert!(records.is_empty());
    assert_eq!(end, PAGE_SIZE);
}

#[test]
fn test_scan_full_page() {
    let (mut flash, format) = setup();
    // 240 bytes of capacity, 12 records of 20 bytes
    let records: Vec<(u16, u32, &str)> = (0..12u16).map(|i| (i, u32::from(i) + 1, "")).collect();
    write_page(&mut flash, &format, 0, &records);

    let (found, end) = scan(&mut flash, format, 0);

    assert_eq!(found.len(), 12);
    assert_eq!(end, PAGE_SIZE);
}
