//! Record Scanner
//!
//! Sequential iteration over the record log of one page.

use crate::backend::{BackendError, FlashBackend};

use super::{Format, RecordHeader, RecordSlot, RECORD_HEADER_SIZE};

/// A record found while scanning a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Offset of the record header within the page
    pub offset: usize,
    pub header: RecordHeader,
    /// Bytes the record occupies, padding included
    pub footprint: usize,
    /// Whether the payload matched its CRC
    pub intact: bool,
}

/// Iterator over the records of a page in write order
///
/// Stops at the first erased slot. A garbled header ends the scan and
/// marks the rest of the page as unusable.
pub struct RecordScanner<'a, B: FlashBackend + ?Sized> {
    backend: &'a mut B,
    format: Format,
    page: u32,
    /// Current position in the page
    offset: usize,
    done: bool,
}

impl<'a, B: FlashBackend + ?Sized> RecordScanner<'a, B> {
    /// Scan `page`, starting after its header
    pub fn new(backend: &'a mut B, format: Format, page: u32) -> Self {
        Self {
            backend,
            format,
            page,
            offset: format.data_start(),
            done: false,
        }
    }

    /// First offset after the log; valid once the iterator is exhausted
    pub fn end_offset(&self) -> usize {
        self.offset
    }

    fn garbled(&mut self) -> Option<Result<ScannedRecord, BackendError>> {
        tracing::debug!(
            "Garbled record header at page {} offset {}, closing page",
            self.page,
            self.offset
        );
        self.offset = self.format.page_size();
        self.done = true;
        None
    }
}

impl<'a, B: FlashBackend + ?Sized> Iterator for RecordScanner<'a, B> {
    type Item = Result<ScannedRecord, BackendError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.offset + RECORD_HEADER_SIZE > self.format.page_size() {
            self.done = true;
            return None;
        }

        let mut raw = [0u8; RECORD_HEADER_SIZE];
        if let Err(e) = self.backend.read(self.page, self.offset, &mut raw) {
            self.done = true;
            return Some(Err(e));
        }

        let header = match RecordHeader::decode(&raw) {
            RecordSlot::Erased => {
                self.done = true;
                return None;
            }
            RecordSlot::Garbled => return self.garbled(),
            RecordSlot::Header(header) => header,
        };

        let footprint = self.format.footprint(header.len as usize);
        if self.offset + footprint > self.format.page_size() {
            return self.garbled();
        }

        let mut payload = vec![0u8; header.len as usize];
        if let Err(e) = self
            .backend
            .read(self.page, self.offset + RECORD_HEADER_SIZE, &mut payload)
        {
            self.done = true;
            return Some(Err(e));
        }

        let record = ScannedRecord {
            offset: self.offset,
            header,
            footprint,
            intact: header.verify(&payload),
        };

        self.offset += footprint;
        Some(Ok(record))
    }
}
