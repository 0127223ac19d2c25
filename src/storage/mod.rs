//! Storage Module
//!
//! Record store over a raw flash partition.
//!
//! ## Responsibilities
//! - Append-only record log per page, superseded copies marked stale
//! - Tombstone deletes, space reclaimed by garbage collection
//! - Crash-consistent GC through a reserved swap page
//! - Rebuild the index from flash on mount
//!
//! ## Page Lifecycle
//! ```text
//!            claim (record_set)
//!   Free ───────────────────────────────► Data
//!    ▲                                     │
//!    │ erase            Swap ──► Receiving │ GC source
//!    │                   ▲          │      ▼
//!    └───────────────────┴──────────┘   Retired ──► erase ──► Swap/Free
//!                           promote to Data
//! ```

mod activity;
mod gc;
mod manager;
mod mount;
mod ops;
mod pages;

use std::time::Duration;

pub use activity::GcPhase;
pub use manager::FlashStorage;
pub(crate) use manager::Mounted;

/// Summary of a completed GC pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Pages erased, including dirty pages cleaned up
    pub pages_erased: usize,
    /// Live records copied to a new page
    pub records_relocated: usize,
    /// Garbage bytes turned back into free space
    pub bytes_reclaimed: usize,
    /// `free_size_get()` at the end of the pass
    pub free_bytes: usize,
    pub duration: Duration,
}

/// Page and record accounting of a mounted store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    pub page_count: u32,
    pub data_pages: usize,
    pub free_pages: usize,
    /// Erased page reserved as GC destination
    pub swap_page: Option<u32>,
    /// Page receiving appends
    pub active_page: Option<u32>,
    pub live_records: usize,
    /// Flash bytes held by live records
    pub live_bytes: usize,
    /// Flash bytes a GC pass could reclaim
    pub garbage_bytes: usize,
    pub free_bytes: usize,
}
