//! Physical operations shared by writes, mount and GC

use bytes::Bytes;

use crate::backend::FlashBackend;
use crate::error::{FlashError, Result};
use crate::index::{IndexEntry, Location};
use crate::layout::{
    Format, PageHeader, PageState, RecordHeader, RecordKey, RecordSlot, RecordState,
    PAGE_STATE_OFFSET, RECORD_HEADER_SIZE, RECORD_STATE_OFFSET,
};

/// Program a page header, turning an erased page into a claimed one
pub(crate) fn write_page_header<B: FlashBackend + ?Sized>(
    backend: &mut B,
    format: &Format,
    page: u32,
    generation: u32,
    state: PageState,
) -> Result<()> {
    let header = PageHeader::new(generation, state).encode(format);
    backend.program(page, 0, &header)?;
    Ok(())
}

/// Advance a page's state byte in place
pub(crate) fn set_page_state<B: FlashBackend + ?Sized>(
    backend: &mut B,
    format: &Format,
    page: u32,
    state: PageState,
) -> Result<()> {
    clear_bits(backend, format, page, PAGE_STATE_OFFSET, state.as_byte())
}

/// Advance a record's state byte in place
pub(crate) fn set_record_state<B: FlashBackend + ?Sized>(
    backend: &mut B,
    format: &Format,
    location: Location,
    state: RecordState,
) -> Result<()> {
    clear_bits(
        backend,
        format,
        location.page,
        location.offset + RECORD_STATE_OFFSET,
        state.as_byte(),
    )
}

/// Rewrite the word holding `offset` with `byte` ANDed into it
fn clear_bits<B: FlashBackend + ?Sized>(
    backend: &mut B,
    format: &Format,
    page: u32,
    offset: usize,
    byte: u8,
) -> Result<()> {
    let start = format.word_start(offset);
    let mut word = vec![0u8; format.word_size()];
    backend.read(page, start, &mut word)?;
    word[offset - start] &= byte;
    backend.program(page, start, &word)?;
    Ok(())
}

/// Program encoded bytes, optionally reading them back
pub(crate) fn program_verified<B: FlashBackend + ?Sized>(
    backend: &mut B,
    location: Location,
    bytes: &[u8],
    verify: bool,
) -> Result<()> {
    backend.program(location.page, location.offset, bytes)?;

    if verify {
        let mut check = vec![0u8; bytes.len()];
        backend.read(location.page, location.offset, &mut check)?;
        if check != bytes {
            return Err(FlashError::Corrupted(format!(
                "read-back mismatch at page {} offset {}",
                location.page, location.offset
            )));
        }
    }

    Ok(())
}

/// Read the raw bytes of an indexed record, padding included
pub(crate) fn read_raw<B: FlashBackend + ?Sized>(
    backend: &mut B,
    entry: &IndexEntry,
) -> Result<Vec<u8>> {
    let mut raw = vec![0u8; entry.footprint];
    backend.read(entry.location.page, entry.location.offset, &mut raw)?;
    Ok(raw)
}

/// Read and validate the payload of an indexed record
pub(crate) fn read_payload<B: FlashBackend + ?Sized>(
    backend: &mut B,
    key: RecordKey,
    entry: &IndexEntry,
) -> Result<Bytes> {
    let raw = read_raw(backend, entry)?;
    let payload = &raw[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + entry.len as usize];
    check_record(key, entry, &raw[..RECORD_HEADER_SIZE], payload)?;
    Ok(Bytes::copy_from_slice(payload))
}

/// Confirm that header bytes and payload match what the index expects
pub(crate) fn check_record(
    key: RecordKey,
    entry: &IndexEntry,
    header: &[u8],
    payload: &[u8],
) -> Result<()> {
    let location = entry.location;
    match RecordHeader::decode(header) {
        RecordSlot::Header(h)
            if h.key == key && h.sequence == entry.sequence && h.verify(payload) =>
        {
            Ok(())
        }
        _ => Err(FlashError::Corrupted(format!(
            "record {} at page {} offset {} failed validation",
            key, location.page, location.offset
        ))),
    }
}

/// Erase a page
pub(crate) fn erase_page<B: FlashBackend + ?Sized>(backend: &mut B, page: u32) -> Result<()> {
    backend.erase(page)?;
    Ok(())
}
