//! Page table
//!
//! Tracks the role, write cursor and live byte count of every page in the
//! partition, and derives free space and GC candidates from them.

use crate::config::Partition;
use crate::layout::Format;

/// What a page is currently used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    /// Erased and claimable for new records
    Free,
    /// Erased and reserved as GC destination
    Swap,
    /// Holds records
    Data,
    /// GC destination with unconfirmed copies
    Receiving,
    /// Must be erased before reuse
    Dirty,
    /// Source of a GC step that failed after its copies were confirmed;
    /// read-only until the next mount settles it
    Retired,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PageInfo {
    pub role: PageRole,
    pub generation: u32,
    /// Next unwritten offset
    pub cursor: usize,
    /// Footprint of records the index points at
    pub live_bytes: usize,
}

#[derive(Debug)]
pub(crate) struct PageTable {
    format: Format,
    first_page: u32,
    pages: Vec<PageInfo>,
    /// Page receiving appends
    active: Option<u32>,
    next_generation: u32,
}

impl PageTable {
    /// All pages free; mount fills in the real state
    pub fn new(partition: &Partition) -> Self {
        let blank = PageInfo {
            role: PageRole::Free,
            generation: 0,
            cursor: partition.format.data_start(),
            live_bytes: 0,
        };

        Self {
            format: partition.format,
            first_page: partition.first_page,
            pages: vec![blank; partition.page_count as usize],
            active: None,
            next_generation: 1,
        }
    }

    pub fn info(&self, page: u32) -> &PageInfo {
        &self.pages[(page - self.first_page) as usize]
    }

    fn info_mut(&mut self, page: u32) -> &mut PageInfo {
        &mut self.pages[(page - self.first_page) as usize]
    }

    /// (page number, info) for every page in the partition
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PageInfo)> {
        let first = self.first_page;
        self.pages
            .iter()
            .enumerate()
            .map(move |(i, info)| (first + i as u32, info))
    }

    pub fn role(&self, page: u32) -> PageRole {
        self.info(page).role
    }

    pub fn set_role(&mut self, page: u32, role: PageRole) {
        self.info_mut(page).role = role;
    }

    pub fn active(&self) -> Option<u32> {
        self.active
    }

    pub fn swap(&self) -> Option<u32> {
        self.iter()
            .find(|(_, info)| info.role == PageRole::Swap)
            .map(|(page, _)| page)
    }

    pub fn cursor(&self, page: u32) -> usize {
        self.info(page).cursor
    }

    /// Erased bytes left at the end of a page
    pub fn tail(&self, page: u32) -> usize {
        self.format.page_size() - self.info(page).cursor
    }

    /// Bytes written to a page, live or not
    pub fn used(&self, page: u32) -> usize {
        self.info(page).cursor - self.format.data_start()
    }

    /// Written bytes no live record points at
    pub fn garbage(&self, page: u32) -> usize {
        self.used(page) - self.info(page).live_bytes
    }

    // =========================================================================
    // Accounting
    // =========================================================================

    pub fn count(&self, role: PageRole) -> usize {
        self.pages.iter().filter(|info| info.role == role).count()
    }

    /// Bytes writable without GC: free pages plus the active page's tail
    ///
    /// Any record whose footprint is at most this value fits, because a
    /// footprint never exceeds one page's capacity.
    pub fn free_size(&self) -> usize {
        let free_pages = self.count(PageRole::Free) * self.format.page_capacity();
        let active_tail = self.active.map_or(0, |page| self.tail(page));
        free_pages + active_tail
    }

    /// Garbage bytes across all data pages
    pub fn reclaimable(&self) -> usize {
        self.data_pages().map(|page| self.garbage(page)).sum()
    }

    pub fn live_bytes(&self) -> usize {
        self.pages.iter().map(|info| info.live_bytes).sum()
    }

    pub fn data_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.iter()
            .filter(|(_, info)| info.role == PageRole::Data)
            .map(|(page, _)| page)
    }

    pub fn pages_with_role(&self, role: PageRole) -> Vec<u32> {
        self.iter()
            .filter(|(_, info)| info.role == role)
            .map(|(page, _)| page)
            .collect()
    }

    /// Data pages holding garbage, most garbage first
    pub fn gc_candidates(&self) -> Vec<u32> {
        let mut candidates: Vec<u32> = self
            .data_pages()
            .filter(|&page| self.garbage(page) > 0)
            .collect();
        candidates.sort_by_key(|&page| (std::cmp::Reverse(self.garbage(page)), page));
        candidates
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Find room for `footprint` bytes
    ///
    /// Returns the page and whether it must be claimed (header written)
    /// before use. Never hands out the swap page.
    pub fn allocate(&self, footprint: usize) -> Option<(u32, bool)> {
        if let Some(active) = self.active {
            if self.tail(active) >= footprint {
                return Some((active, false));
            }
        }

        if footprint > self.format.page_capacity() {
            return None;
        }

        self.iter()
            .find(|(_, info)| info.role == PageRole::Free)
            .map(|(page, _)| (page, true))
    }

    /// Take the next page generation number
    pub fn next_generation(&mut self) -> u32 {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        generation
    }

    pub fn set_next_generation(&mut self, generation: u32) {
        self.next_generation = generation;
    }

    /// A header has been written: the page now holds records
    pub fn claim(&mut self, page: u32, role: PageRole, generation: u32) {
        let data_start = self.format.data_start();
        let info = self.info_mut(page);
        info.role = role;
        info.generation = generation;
        info.cursor = data_start;
        info.live_bytes = 0;
    }

    /// Claim a free page as the new append target
    pub fn claim_active(&mut self, page: u32, generation: u32) {
        self.claim(page, PageRole::Data, generation);
        self.active = Some(page);
    }

    /// Move the cursor past `footprint` written bytes
    pub fn advance(&mut self, page: u32, footprint: usize) {
        self.info_mut(page).cursor += footprint;
    }

    /// Place the cursor after an existing log (mount)
    pub fn set_cursor(&mut self, page: u32, cursor: usize) {
        self.info_mut(page).cursor = cursor;
    }

    pub fn add_live(&mut self, page: u32, footprint: usize) {
        self.info_mut(page).live_bytes += footprint;
    }

    pub fn release_live(&mut self, page: u32, footprint: usize) {
        let info = self.info_mut(page);
        info.live_bytes = info.live_bytes.saturating_sub(footprint);
    }

    /// A page has been erased; it becomes the swap page if none exists
    pub fn mark_erased(&mut self, page: u32) {
        let role = if self.swap().is_none() {
            PageRole::Swap
        } else {
            PageRole::Free
        };

        let data_start = self.format.data_start();
        let info = self.info_mut(page);
        info.role = role;
        info.generation = 0;
        info.cursor = data_start;
        info.live_bytes = 0;

        if self.active == Some(page) {
            self.active = None;
        }
    }

    /// A page failed mid-operation and must be erased before reuse
    pub fn mark_dirty(&mut self, page: u32) {
        self.info_mut(page).role = PageRole::Dirty;
        if self.active == Some(page) {
            self.active = None;
        }
    }

    /// Stop appending to a page after a failed program
    ///
    /// A torn record may stop the mount scan, so nothing may follow it.
    pub fn seal(&mut self, page: u32) {
        let page_size = self.format.page_size();
        self.info_mut(page).cursor = page_size;
        if self.active == Some(page) {
            self.active = None;
        }
    }

    /// Freeze the source of a GC step that could not be completed
    pub fn retire(&mut self, page: u32) {
        self.info_mut(page).role = PageRole::Retired;
        if self.active == Some(page) {
            self.active = None;
        }
    }

    /// Pick the data page with the largest erased tail as append target
    pub fn choose_active(&mut self) {
        let current = self.active.filter(|&page| self.role(page) == PageRole::Data);
        let best = self
            .data_pages()
            .filter(|&page| self.tail(page) >= self.format.footprint(0))
            .max_by_key(|&page| (self.tail(page), Some(page) == current));

        self.active = best;
    }
}
