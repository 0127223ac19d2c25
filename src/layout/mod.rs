//! Record Layout Module
//!
//! On-flash encoding of pages and records.
//!
//! ## Page Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Page Header (16 bytes, padded to word size)             │
//! │   Magic: "FREC" (4) | Generation: u32 (4)               │
//! │   State: u8 (1) | Reserved: 0xFF (3) | CRC32 (4)        │
//! ├─────────────────────────────────────────────────────────┤
//! │ Record Log (append only)                                │
//! │   [Record Header (20)][Payload][0xFF padding]           │
//! │   ... repeated ...                                      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Erased tail (0xFF), first erased marker ends the log    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Header
//! ```text
//! ┌────────┬───────┬──────┬────────┬────────┬────────┬──────┬──────────┬───────┐
//! │Mark (1)│St (1) │Rsv(2)│Page (2)│Key (2) │Len (2) │Rsv(2)│ Seq (4)  │CRC (4)│
//! └────────┴───────┴──────┴────────┴────────┴────────┴──────┴──────────┴───────┘
//! ```
//!
//! State bytes only ever lose bits, so state transitions are programmed in
//! place without erasing the page.
//!
//! Sequence numbers order copies of the same key and never wrap. A device
//! holding a record with sequence `u32::MAX` accepts no further writes.

mod page;
mod record;
mod scanner;

pub use page::{PageHeader, PageSlot, PageState};
pub use record::{encode_record, RecordHeader, RecordKey, RecordSlot, RecordState};
pub use scanner::{RecordScanner, ScannedRecord};

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a claimed page
pub const PAGE_MAGIC: &[u8; 4] = b"FREC";

/// Unpadded page header size
pub const PAGE_HEADER_SIZE: usize = 16;

/// Offset of the page state byte inside the page header
pub const PAGE_STATE_OFFSET: usize = 8;

/// Marker byte opening every written record
pub const RECORD_MARKER: u8 = 0x5A;

/// Unpadded record header size
pub const RECORD_HEADER_SIZE: usize = 20;

/// Offset of the record state byte inside the record header
pub const RECORD_STATE_OFFSET: usize = 1;

/// Largest encodable payload length; `0xFFFF` reads as an unprogrammed field
pub const MAX_LENGTH_FIELD: usize = u16::MAX as usize - 1;

/// Round `value` up to a multiple of `align`
pub fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

// =============================================================================
// Format
// =============================================================================

/// Size arithmetic for one page geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    page_size: usize,
    word_size: usize,
}

impl Format {
    pub fn new(page_size: usize, word_size: usize) -> Self {
        Self {
            page_size,
            word_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn word_size(&self) -> usize {
        self.word_size
    }

    /// Offset of the first record in a page
    pub fn data_start(&self) -> usize {
        align_up(PAGE_HEADER_SIZE, self.word_size)
    }

    /// Bytes available for records in an empty page
    pub fn page_capacity(&self) -> usize {
        self.page_size.saturating_sub(self.data_start())
    }

    /// Bytes a record with `len` payload bytes occupies on flash
    pub fn footprint(&self, len: usize) -> usize {
        align_up(RECORD_HEADER_SIZE + len, self.word_size)
    }

    /// Largest payload that fits in one page and in the length field
    pub fn max_record_len(&self) -> usize {
        self.page_capacity()
            .saturating_sub(RECORD_HEADER_SIZE)
            .min(MAX_LENGTH_FIELD)
    }

    /// Start of the word that holds the byte at `offset`
    pub fn word_start(&self, offset: usize) -> usize {
        offset - offset % self.word_size
    }
}
