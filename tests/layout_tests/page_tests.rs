//! Tests for page headers and format arithmetic

use flashrec::layout::{
    align_up, Format, PageHeader, PageSlot, PageState, MAX_LENGTH_FIELD, PAGE_HEADER_SIZE,
    PAGE_STATE_OFFSET,
};

// =============================================================================
// Format Tests
// =============================================================================

#[test]
fn test_align_up() {
    assert_eq!(align_up(0, 4), 0);
    assert_eq!(align_up(1, 4), 4);
    assert_eq!(align_up(20, 4), 20);
    assert_eq!(align_up(21, 8), 24);
}

#[test]
fn test_format_sizes() {
    let format = Format::new(4096, 4);

    assert_eq!(format.data_start(), 16);
    assert_eq!(format.page_capacity(), 4080);
    assert_eq!(format.footprint(0), 20);
    assert_eq!(format.footprint(1), 24);
    assert_eq!(format.footprint(17), 40);
    assert_eq!(format.max_record_len(), 4060);
    assert_eq!(format.word_start(9), 8);
}

#[test]
fn test_format_wide_words() {
    let format = Format::new(4096, 32);

    assert_eq!(format.data_start(), 32);
    assert_eq!(format.footprint(0), 32);
    assert_eq!(format.footprint(13), 64);
    assert_eq!(format.word_start(33), 32);
}

#[test]
fn test_max_record_len_bounded_by_length_field() {
    let format = Format::new(256 * 1024, 4);

    assert_eq!(format.max_record_len(), MAX_LENGTH_FIELD);
    assert_eq!(MAX_LENGTH_FIELD, 0xFFFE);
}

// =============================================================================
// Page Header Tests
// =============================================================================

#[test]
fn test_page_header_roundtrip() {
    let format = Format::new(4096, 4);
    let header = PageHeader::new(42, PageState::Data);

    let encoded = header.encode(&format);

    assert_eq!(encoded.len(), format.data_start());
    assert_eq!(&encoded[0..4], b"FREC");
    assert_eq!(PageHeader::decode(&encoded), PageSlot::Header(header));
}

#[test]
fn test_page_header_padded_to_word() {
    let format = Format::new(4096, 64);

    let encoded = PageHeader::new(1, PageState::Receiving).encode(&format);

    assert_eq!(encoded.len(), 64);
    assert!(encoded[PAGE_HEADER_SIZE..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_page_state_transitions_clear_bits() {
    let format = Format::new(4096, 4);
    let mut encoded = PageHeader::new(7, PageState::Receiving).encode(&format);

    for state in [PageState::Data, PageState::Retired] {
        encoded[PAGE_STATE_OFFSET] &= state.as_byte();
        assert_eq!(
            PageHeader::decode(&encoded),
            PageSlot::Header(PageHeader::new(7, state))
        );
    }
}

#[test]
fn test_erased_header() {
    assert_eq!(PageHeader::decode(&[0xFF; 16]), PageSlot::Erased);
}

#[test]
fn test_invalid_headers() {
    let format = Format::new(4096, 4);
    let good = PageHeader::new(3, PageState::Data).encode(&format);

    // Bad magic
    let mut bad = good.clone();
    bad[0] = b'X';
    assert_eq!(PageHeader::decode(&bad), PageSlot::Invalid);

    // Generation does not match CRC
    let mut bad = good.clone();
    bad[4] ^= 0x01;
    assert_eq!(PageHeader::decode(&bad), PageSlot::Invalid);

    // Unknown state byte
    let mut bad = good.clone();
    bad[PAGE_STATE_OFFSET] = 0x0F;
    assert_eq!(PageHeader::decode(&bad), PageSlot::Invalid);

    // Torn: only the first word landed
    let mut torn = [0xFFu8; 16];
    torn[..4].copy_from_slice(&good[..4]);
    assert_eq!(PageHeader::decode(&torn), PageSlot::Invalid);

    // Too short
    assert_eq!(PageHeader::decode(&good[..8]), PageSlot::Invalid);
}

#[test]
fn test_page_state_bytes() {
    assert_eq!(PageState::Erased.as_byte(), 0xFF);
    assert_eq!(PageState::Receiving.as_byte(), 0xFE);
    assert_eq!(PageState::Data.as_byte(), 0xFC);
    assert_eq!(PageState::Retired.as_byte(), 0xF8);
    assert_eq!(PageState::from_byte(0xFC), Some(PageState::Data));
    assert_eq!(PageState::from_byte(0x00), None);
}
