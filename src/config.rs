//! Configuration for flashrec
//!
//! Centralized configuration with sensible defaults.

use crate::backend::Geometry;
use crate::error::{FlashError, Result};
use crate::layout::{Format, RECORD_HEADER_SIZE};

/// Main configuration for a flash record store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Partition Configuration
    // -------------------------------------------------------------------------
    /// First physical page owned by the store
    pub first_page: u32,

    /// Number of pages owned by the store (None = to the end of the device)
    /// One of them is always held back as the GC swap page.
    pub page_count: Option<u32>,

    // -------------------------------------------------------------------------
    // Record Configuration
    // -------------------------------------------------------------------------
    /// Cap on payload length (None = largest that fits one page)
    pub max_record_len: Option<usize>,

    /// Read back every program and compare
    pub verify_writes: bool,

    // -------------------------------------------------------------------------
    // Garbage Collection Configuration
    // -------------------------------------------------------------------------
    /// Start a GC pass when a write runs out of space and garbage exists
    pub gc_on_exhaustion: bool,

    /// Name of the background GC thread
    pub worker_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_page: 0,
            page_count: None,
            max_record_len: None,
            verify_writes: true,
            gc_on_exhaustion: true,
            worker_name: "flashrec-gc".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolve the partition against a device, rejecting unusable layouts
    pub(crate) fn resolve(&self, geometry: &Geometry) -> Result<Partition> {
        let word = geometry.word_size;
        if word == 0 || !word.is_power_of_two() {
            return Err(FlashError::Config(format!(
                "word size {} is not a power of two",
                word
            )));
        }
        if geometry.page_size % word != 0 {
            return Err(FlashError::Config(format!(
                "page size {} is not a multiple of word size {}",
                geometry.page_size, word
            )));
        }

        let format = Format::new(geometry.page_size, word);
        if format.page_capacity() < format.footprint(0) {
            return Err(FlashError::Config(format!(
                "page size {} cannot hold a {} byte record header",
                geometry.page_size, RECORD_HEADER_SIZE
            )));
        }

        if self.first_page >= geometry.page_count {
            return Err(FlashError::Config(format!(
                "first page {} is beyond the device's {} pages",
                self.first_page, geometry.page_count
            )));
        }

        let available = geometry.page_count - self.first_page;
        let page_count = self.page_count.unwrap_or(available);
        if page_count > available {
            return Err(FlashError::Config(format!(
                "partition of {} pages from page {} exceeds the device's {} pages",
                page_count, self.first_page, geometry.page_count
            )));
        }
        if page_count < 2 {
            return Err(FlashError::Config(format!(
                "partition needs at least 2 pages (data + swap), got {}",
                page_count
            )));
        }

        let max_record_len = match self.max_record_len {
            Some(cap) => cap.min(format.max_record_len()),
            None => format.max_record_len(),
        };

        Ok(Partition {
            first_page: self.first_page,
            page_count,
            format,
            max_record_len,
        })
    }
}

/// Partition of a device resolved from a [`Config`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Partition {
    pub first_page: u32,
    pub page_count: u32,
    pub format: Format,
    pub max_record_len: usize,
}

impl Partition {
    /// Physical page numbers owned by the store
    pub fn pages(&self) -> std::ops::Range<u32> {
        self.first_page..self.first_page + self.page_count
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the first physical page of the partition
    pub fn first_page(mut self, page: u32) -> Self {
        self.config.first_page = page;
        self
    }

    /// Set the number of pages in the partition
    pub fn page_count(mut self, count: u32) -> Self {
        self.config.page_count = Some(count);
        self
    }

    /// Cap the payload length of a single record
    pub fn max_record_len(mut self, len: usize) -> Self {
        self.config.max_record_len = Some(len);
        self
    }

    /// Enable or disable read-back verification of writes
    pub fn verify_writes(mut self, verify: bool) -> Self {
        self.config.verify_writes = verify;
        self
    }

    /// Enable or disable GC on space exhaustion
    pub fn gc_on_exhaustion(mut self, enabled: bool) -> Self {
        self.config.gc_on_exhaustion = enabled;
        self
    }

    /// Set the GC thread name
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker_name = name.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
