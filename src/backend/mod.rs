//! Flash Backend Module
//!
//! Raw page-level access to block-erasable flash.
//!
//! ## Responsibilities
//! - Describe the device geometry (page size, page count, write granularity)
//! - Erase whole pages to `0xFF`
//! - Program aligned byte runs, clearing bits only (1 -> 0)
//! - Read arbitrary byte ranges
//!
//! ## NOR Programming Model
//! ```text
//!   erase(page)          program(page, off, data)      program again
//!   ┌──────────────┐     ┌──────────────┐              ┌──────────────┐
//!   │ FF FF FF FF  │ ──► │ 5A FE FF FF  │ ──(clear)──► │ 5A FC FF FF  │  ok
//!   └──────────────┘     └──────────────┘              └──────────────┘
//!                                         ──(set)────► ProgramConflict
//! ```
//!
//! Two implementations ship with the crate: [`MemoryFlash`] (RAM simulation
//! with latency, wear and fault injection) and [`FileFlash`] (a flash image
//! file on the host filesystem).

mod file;
mod memory;

use thiserror::Error;

pub use file::FileFlash;
pub use memory::{FaultInjector, MemoryFlash, MemoryFlashOptions};

/// Value of every byte after an erase
pub const ERASED_BYTE: u8 = 0xFF;

// =============================================================================
// Errors
// =============================================================================

/// Low-level device errors reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("access out of bounds: page {page}, offset {offset}, len {len}")]
    OutOfBounds { page: u32, offset: usize, len: usize },

    #[error("unaligned program: offset {offset}, len {len}, word size {word_size}")]
    NotAligned {
        offset: usize,
        len: usize,
        word_size: usize,
    },

    #[error("program would set cleared bits at page {page}, offset {offset}")]
    ProgramConflict { page: u32, offset: usize },

    #[error("page {page} exceeded {cycles} erase cycles")]
    WornOut { page: u32, cycles: u32 },

    #[error("device I/O error: {0}")]
    Io(String),

    #[error("injected fault during {0}")]
    Injected(&'static str),
}

impl From<std::io::Error> for BackendError {
    fn from(error: std::io::Error) -> Self {
        BackendError::Io(error.to_string())
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Physical layout of a flash device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Size of one erasable page in bytes
    pub page_size: usize,

    /// Number of pages on the device
    pub page_count: u32,

    /// Minimum program granularity in bytes
    pub word_size: usize,
}

impl Geometry {
    pub fn new(page_size: usize, page_count: u32, word_size: usize) -> Self {
        Self {
            page_size,
            page_count,
            word_size,
        }
    }

    /// Total device size in bytes
    pub fn total_size(&self) -> usize {
        self.page_size * self.page_count as usize
    }

    /// Byte address of `offset` within `page`
    pub fn address(&self, page: u32, offset: usize) -> usize {
        page as usize * self.page_size + offset
    }

    /// Check that a byte range lies inside one page
    pub fn check_range(&self, page: u32, offset: usize, len: usize) -> Result<(), BackendError> {
        let in_bounds = page < self.page_count
            && offset
                .checked_add(len)
                .map_or(false, |end| end <= self.page_size);

        if in_bounds {
            Ok(())
        } else {
            Err(BackendError::OutOfBounds { page, offset, len })
        }
    }

    /// Check that a program request starts and ends on word boundaries
    pub fn check_aligned(&self, offset: usize, len: usize) -> Result<(), BackendError> {
        if offset % self.word_size == 0 && len % self.word_size == 0 {
            Ok(())
        } else {
            Err(BackendError::NotAligned {
                offset,
                len,
                word_size: self.word_size,
            })
        }
    }
}

impl Default for Geometry {
    /// 64 KiB split into 16 pages of 4 KiB, 32-bit words
    fn default() -> Self {
        Self::new(4096, 16, 4)
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Page-level flash device
///
/// One physical operation at a time: every method takes `&mut self`.
/// Implementations must reject programs that would set a cleared bit.
pub trait FlashBackend: Send {
    /// Device geometry
    fn geometry(&self) -> Geometry;

    /// Erase a whole page to `0xFF`
    fn erase(&mut self, page: u32) -> Result<(), BackendError>;

    /// Program `data` at `offset` within `page`
    fn program(&mut self, page: u32, offset: usize, data: &[u8]) -> Result<(), BackendError>;

    /// Read `out.len()` bytes from `offset` within `page`
    fn read(&mut self, page: u32, offset: usize, out: &mut [u8]) -> Result<(), BackendError>;
}

impl<B: FlashBackend + ?Sized> FlashBackend for Box<B> {
    fn geometry(&self) -> Geometry {
        (**self).geometry()
    }

    fn erase(&mut self, page: u32) -> Result<(), BackendError> {
        (**self).erase(page)
    }

    fn program(&mut self, page: u32, offset: usize, data: &[u8]) -> Result<(), BackendError> {
        (**self).program(page, offset, data)
    }

    fn read(&mut self, page: u32, offset: usize, out: &mut [u8]) -> Result<(), BackendError> {
        (**self).read(page, offset, out)
    }
}

/// Verify that programming `new` over `old` only clears bits
pub(crate) fn check_program(
    page: u32,
    offset: usize,
    old: &[u8],
    new: &[u8],
) -> Result<(), BackendError> {
    match old.iter().zip(new).position(|(o, n)| o & n != *n) {
        Some(i) => Err(BackendError::ProgramConflict {
            page,
            offset: offset + i,
        }),
        None => Ok(()),
    }
}
