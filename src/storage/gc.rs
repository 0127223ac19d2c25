//! Garbage Collector
//!
//! Runs on the worker thread. Each source page is handled under one hold of
//! the core lock, so readers interleave between pages.
//!
//! ## Relocation Step
//! ```text
//!   1. claim swap page as Receiving (first source into it)
//!   2. copy live records, read each copy back
//!   3. mark source Retired
//!   4. promote destination to Data
//!   5. repoint index entries
//!   6. erase source; it becomes the next swap page
//! ```
//! A crash at any step leaves flash in a state mount can settle without
//! losing a confirmed record.

use std::time::Instant;

use super::activity::{Activity, GcPhase};
use super::manager::{Core, Shared};
use super::ops::{
    check_record, erase_page, program_verified, read_raw, set_page_state, write_page_header,
};
use super::pages::PageRole;
use super::{GcReport, Mounted};
use crate::backend::FlashBackend;
use crate::error::{FlashError, Result};
use crate::index::{IndexEntry, Location};
use crate::layout::{PageState, RecordKey, RECORD_HEADER_SIZE};

/// How a source page was reclaimed
enum Step {
    /// Held no live records
    Dropped,
    /// Live records now sit in this page
    Moved(u32),
    /// No erased page left to copy into
    Stalled,
}

/// Run one pass and publish its outcome
pub(crate) fn run_pass<B: FlashBackend>(shared: &Shared<B>) {
    let started = Instant::now();
    let outcome = collect(shared).map(|mut report| {
        report.duration = started.elapsed();
        report
    });

    match &outcome {
        Ok(report) => tracing::info!(
            "GC pass done: {} pages erased, {} records relocated, {} bytes reclaimed, {} bytes free ({:?})",
            report.pages_erased,
            report.records_relocated,
            report.bytes_reclaimed,
            report.free_bytes,
            report.duration
        ),
        Err(e) => tracing::error!("GC pass failed: {}", e),
    }

    shared.activity.finish_gc(outcome);
}

fn collect<B: FlashBackend>(shared: &Shared<B>) -> Result<GcReport> {
    let mut report = GcReport::default();
    shared.activity.set_phase(GcPhase::Scanning);

    // Dirty pages first, so no stale Receiving header outlives this pass
    let candidates = {
        let mut core = shared.core.lock();
        let Core {
            backend, mounted, ..
        } = &mut *core;
        let m = mounted.as_mut().ok_or(FlashError::NotInitialized)?;

        for page in m.pages.pages_with_role(PageRole::Dirty) {
            tracing::debug!("Erasing dirty page {}", page);
            erase_page(backend, page)?;
            m.pages.mark_erased(page);
            report.pages_erased += 1;
        }

        m.pages.gc_candidates()
    };

    tracing::debug!("GC candidates: {:?}", candidates);

    let mut destination: Option<u32> = None;
    for source in candidates {
        shared.activity.set_phase(GcPhase::Relocating);

        let mut core = shared.core.lock();
        let Core {
            backend, mounted, ..
        } = &mut *core;
        let m = mounted.as_mut().ok_or(FlashError::NotInitialized)?;

        let step = reclaim_page(backend, m, &shared.activity, source, destination, &mut report)?;
        // Keep free_size_get() honest between steps
        m.pages.choose_active();

        match step {
            Step::Dropped => {}
            Step::Moved(page) => destination = Some(page),
            Step::Stalled => {
                tracing::warn!("No erased page to relocate into, ending pass early");
                break;
            }
        }
    }

    let mut core = shared.core.lock();
    let m = core.mounted.as_mut().ok_or(FlashError::NotInitialized)?;
    m.pages.choose_active();
    report.free_bytes = m.pages.free_size();

    Ok(report)
}

fn reclaim_page<B: FlashBackend>(
    backend: &mut B,
    m: &mut Mounted,
    activity: &Activity,
    source: u32,
    destination: Option<u32>,
    report: &mut GcReport,
) -> Result<Step> {
    let format = m.partition.format;
    let garbage = m.pages.garbage(source);
    let live = m.pages.info(source).live_bytes;

    if live == 0 {
        if let Err(e) = set_page_state(backend, &format, source, PageState::Retired) {
            m.pages.mark_dirty(source);
            return Err(e);
        }
        activity.set_phase(GcPhase::Erasing);
        erase_source(backend, m, source)?;

        report.pages_erased += 1;
        report.bytes_reclaimed += garbage;
        tracing::debug!("Reclaimed page {} ({} bytes, nothing live)", source, garbage);
        return Ok(Step::Dropped);
    }

    // Step 1: Pick the destination, claiming the swap page if needed
    let target = match destination.filter(|&page| m.pages.tail(page) >= live) {
        Some(page) => page,
        None => {
            let Some(swap) = m.pages.swap() else {
                return Ok(Step::Stalled);
            };
            let generation = m.pages.next_generation();
            if let Err(e) =
                write_page_header(backend, &format, swap, generation, PageState::Receiving)
            {
                m.pages.mark_dirty(swap);
                return Err(e);
            }
            m.pages.claim(swap, PageRole::Receiving, generation);
            swap
        }
    };

    // Step 2: Copy and confirm
    let mut entries: Vec<(RecordKey, IndexEntry)> = m
        .index
        .iter()
        .filter(|(_, entry)| entry.location.page == source)
        .map(|(key, entry)| (*key, *entry))
        .collect();
    entries.sort_by_key(|(_, entry)| entry.location.offset);

    let mut moved: Vec<(RecordKey, IndexEntry, Location)> = Vec::with_capacity(entries.len());
    if let Err(e) = copy_records(backend, m, target, &entries, &mut moved) {
        match m.pages.role(target) {
            PageRole::Receiving => m.pages.mark_dirty(target),
            _ => m.pages.seal(target),
        }
        return Err(e);
    }

    // Steps 3-4: Retire the source, then confirm the destination
    if let Err(e) = set_page_state(backend, &format, source, PageState::Retired) {
        m.pages.retire(source);
        return Err(e);
    }
    if m.pages.role(target) == PageRole::Receiving {
        if let Err(e) = set_page_state(backend, &format, target, PageState::Data) {
            m.pages.retire(source);
            return Err(e);
        }
        m.pages.set_role(target, PageRole::Data);
    }

    // Step 5: Repoint
    for (key, entry, to) in &moved {
        if m.index.relocate(key, entry.location, *to) {
            m.pages.add_live(target, entry.footprint);
        }
    }

    // Step 6: Erase the source
    activity.set_phase(GcPhase::Erasing);
    erase_source(backend, m, source)?;

    report.pages_erased += 1;
    report.records_relocated += moved.len();
    report.bytes_reclaimed += garbage;

    tracing::debug!(
        "Moved {} records from page {} to page {}, reclaimed {} bytes",
        moved.len(),
        source,
        target,
        garbage
    );
    Ok(Step::Moved(target))
}

fn copy_records<B: FlashBackend>(
    backend: &mut B,
    m: &mut Mounted,
    target: u32,
    entries: &[(RecordKey, IndexEntry)],
    moved: &mut Vec<(RecordKey, IndexEntry, Location)>,
) -> Result<()> {
    for (key, entry) in entries {
        let raw = read_raw(backend, entry)?;
        let (header, body) = raw.split_at(RECORD_HEADER_SIZE);
        check_record(*key, entry, header, &body[..entry.len as usize])?;

        let to = Location::new(target, m.pages.cursor(target));
        m.pages.advance(target, entry.footprint);
        program_verified(backend, to, &raw, true)?;

        moved.push((*key, *entry, to));
    }
    Ok(())
}

fn erase_source<B: FlashBackend>(backend: &mut B, m: &mut Mounted, source: u32) -> Result<()> {
    if let Err(e) = erase_page(backend, source) {
        m.pages.mark_dirty(source);
        return Err(e);
    }
    m.pages.mark_erased(source);
    Ok(())
}
