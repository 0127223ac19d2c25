//! Record Index Module
//!
//! In-memory map from record key to the flash location of its newest live
//! copy.
//!
//! ## Responsibilities
//! - O(log n) lookup of a record's location
//! - Resolve duplicate copies by recency (record sequence number)
//! - Repoint entries when GC relocates a record
//!
//! The index only holds locations; payload bytes stay on flash.

mod table;

pub use table::RecordIndex;

/// Physical position of a record copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Physical flash page
    pub page: u32,
    /// Offset of the record header within the page
    pub offset: usize,
}

impl Location {
    pub fn new(page: u32, offset: usize) -> Self {
        Self { page, offset }
    }
}

/// Index entry for one live record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub location: Location,
    /// Payload length
    pub len: u16,
    /// Write sequence of this copy
    pub sequence: u32,
    /// Bytes occupied on flash, padding included
    pub footprint: usize,
}
