//! Mount and recovery
//!
//! Rebuilds the page table and index from flash on `init()`, finishing or
//! rolling back a GC step that was interrupted by power loss.
//!
//! ## Interrupted GC States
//! ```text
//!   destination   source     action
//!   Receiving     Data       erase destination (copies unconfirmed)
//!   Receiving     Retired    promote destination, erase source
//!   Data          Retired    erase source
//! ```
//!
//! A Retired source may carry tombstones written after its copies were
//! confirmed. They are collected before the page is erased.

use std::collections::HashMap;

use super::ops::{erase_page, set_page_state, set_record_state};
use super::pages::{PageRole, PageTable};
use super::Mounted;
use crate::backend::{FlashBackend, ERASED_BYTE};
use crate::config::Partition;
use crate::error::Result;
use crate::index::{IndexEntry, Location, RecordIndex};
use crate::layout::{
    PageHeader, PageSlot, PageState, RecordKey, RecordScanner, RecordState, PAGE_HEADER_SIZE,
};

/// Scan the partition and rebuild in-memory state
pub(crate) fn mount<B: FlashBackend + ?Sized>(
    backend: &mut B,
    partition: Partition,
) -> Result<Mounted> {
    let format = partition.format;
    let mut pages = PageTable::new(&partition);

    // Step 1: Classify every page by its header
    let mut headers: Vec<(u32, PageHeader)> = Vec::new();
    let mut to_erase: Vec<u32> = Vec::new();
    let mut max_generation = 0u32;

    for page in partition.pages() {
        let mut raw = [0u8; PAGE_HEADER_SIZE];
        backend.read(page, 0, &mut raw)?;

        match PageHeader::decode(&raw) {
            PageSlot::Erased => {
                if !is_page_erased(backend, format.page_size(), page)? {
                    tracing::warn!("Page {} has an erased header but stray data", page);
                    to_erase.push(page);
                }
            }
            PageSlot::Invalid => {
                tracing::warn!("Page {} has an invalid header", page);
                to_erase.push(page);
            }
            PageSlot::Header(header) => {
                max_generation = max_generation.max(header.generation);
                headers.push((page, header));
            }
        }
    }

    // Step 2: Resolve pages left mid-GC
    let source_retired = headers
        .iter()
        .any(|(_, header)| header.state == PageState::Retired);

    let mut data_pages: Vec<(u32, u32)> = Vec::new();
    let mut retired: Vec<u32> = Vec::new();
    for (page, header) in headers {
        match header.state {
            PageState::Data => data_pages.push((page, header.generation)),
            PageState::Receiving if source_retired => {
                tracing::warn!("Promoting GC destination page {} after interruption", page);
                set_page_state(backend, &format, page, PageState::Data)?;
                data_pages.push((page, header.generation));
            }
            PageState::Retired => retired.push(page),
            // decode() never yields an Erased header
            PageState::Receiving | PageState::Erased => {
                tracing::warn!("Discarding unconfirmed GC destination page {}", page);
                to_erase.push(page);
            }
        }
    }

    // Step 3: Erase leftovers (they stay Free in the page table)
    for page in to_erase {
        erase_page(backend, page)?;
    }

    let mut index = RecordIndex::new();
    let mut losers: Vec<Location> = Vec::new();
    let mut tombstones: HashMap<RecordKey, u32> = HashMap::new();
    let mut max_sequence = 0u64;
    let mut corrupted = 0usize;

    // Step 4: Deletes that landed on a retired source still count
    for &page in &retired {
        for record in RecordScanner::new(backend, format, page) {
            let record = record?;
            if !record.intact {
                continue;
            }
            let header = record.header;
            max_sequence = max_sequence.max(u64::from(header.sequence));
            if header.state == RecordState::Tombstoned {
                let newest = tombstones.entry(header.key).or_insert(0);
                *newest = (*newest).max(header.sequence);
            }
        }
    }

    // Step 5: Scan record logs, newest copy of each key wins
    for &(page, generation) in &data_pages {
        pages.claim(page, PageRole::Data, generation);

        let mut scanner = RecordScanner::new(backend, format, page);
        for record in scanner.by_ref() {
            let record = record?;
            if !record.intact {
                corrupted += 1;
                continue;
            }

            let header = record.header;
            max_sequence = max_sequence.max(u64::from(header.sequence));

            match header.state {
                RecordState::Live => {
                    let entry = IndexEntry {
                        location: Location::new(page, record.offset),
                        len: header.len,
                        sequence: header.sequence,
                        footprint: record.footprint,
                    };
                    if let Some(loser) = index.offer(header.key, entry) {
                        losers.push(loser.location);
                    }
                }
                RecordState::Tombstoned => {
                    let newest = tombstones.entry(header.key).or_insert(0);
                    *newest = (*newest).max(header.sequence);
                }
                RecordState::Stale | RecordState::Erased => {}
            }
        }

        let end = scanner.end_offset();
        pages.set_cursor(page, end);
    }

    // A tombstone hides any older live copy of its key; an equal sequence
    // is a relocated copy of the deleted write itself
    for (key, deleted_at) in tombstones {
        let hidden = index
            .get(&key)
            .map_or(false, |entry| entry.sequence <= deleted_at);
        if hidden {
            if let Some(entry) = index.remove(&key) {
                losers.push(entry.location);
            }
        }
    }

    // Step 6: Persist the resolution so it survives the next mount
    if !losers.is_empty() {
        tracing::warn!("Marking {} superseded record copies stale", losers.len());
    }
    for location in &losers {
        set_record_state(backend, &format, *location, RecordState::Stale)?;
    }

    // Only now may the tombstones on retired sources go
    for page in retired {
        tracing::warn!("Erasing retired GC source page {}", page);
        erase_page(backend, page)?;
    }

    if corrupted > 0 {
        tracing::warn!("Skipped {} records with bad checksums", corrupted);
    }

    // Step 7: Live accounting
    for (_, entry) in index.iter() {
        pages.add_live(entry.location.page, entry.footprint);
    }

    // Step 8: Reserve a swap page and pick the append target
    let first_free = pages
        .iter()
        .find(|(_, info)| info.role == PageRole::Free)
        .map(|(page, _)| page);
    match first_free {
        Some(page) => pages.set_role(page, PageRole::Swap),
        None => tracing::warn!("No erased page available as GC swap"),
    }

    pages.set_next_generation(max_generation.wrapping_add(1).max(1));
    pages.choose_active();

    tracing::info!(
        "Mounted {} pages: {} data, {} free, {} live records, {} bytes free",
        partition.page_count,
        pages.count(PageRole::Data),
        pages.count(PageRole::Free),
        index.len(),
        pages.free_size()
    );

    Ok(Mounted {
        partition,
        pages,
        index,
        next_sequence: max_sequence + 1,
    })
}

fn is_page_erased<B: FlashBackend + ?Sized>(
    backend: &mut B,
    page_size: usize,
    page: u32,
) -> Result<bool> {
    let mut raw = vec![0u8; page_size];
    backend.read(page, 0, &mut raw)?;
    Ok(raw.iter().all(|&b| b == ERASED_BYTE))
}
