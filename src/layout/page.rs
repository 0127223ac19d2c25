//! Page header codec

use bytes::{Buf, BufMut, BytesMut};

use super::{Format, PAGE_HEADER_SIZE, PAGE_MAGIC, PAGE_STATE_OFFSET};
use crate::backend::ERASED_BYTE;

/// Lifecycle of a claimed page, encoded by clearing bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageState {
    /// No header programmed
    Erased = 0xFF,
    /// GC destination, copies not yet confirmed
    Receiving = 0xFE,
    /// Holds records, accepts appends
    Data = 0xFC,
    /// GC source whose live records are confirmed copied
    Retired = 0xF8,
}

impl PageState {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xFF => Some(PageState::Erased),
            0xFE => Some(PageState::Receiving),
            0xFC => Some(PageState::Data),
            0xF8 => Some(PageState::Retired),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Decoded page header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Monotonic counter assigned when the page was claimed
    pub generation: u32,
    pub state: PageState,
}

/// Result of decoding the first bytes of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSlot {
    /// Header area is erased
    Erased,
    /// Header present but unreadable (torn write, bad magic or CRC)
    Invalid,
    Header(PageHeader),
}

impl PageHeader {
    pub fn new(generation: u32, state: PageState) -> Self {
        Self { generation, state }
    }

    /// Encode into a word-padded header
    pub fn encode(&self, format: &Format) -> BytesMut {
        let mut buf = BytesMut::with_capacity(format.data_start());
        buf.put_slice(PAGE_MAGIC);
        buf.put_u32_le(self.generation);

        let crc = crc32fast::hash(&buf[..PAGE_STATE_OFFSET]);

        buf.put_u8(self.state.as_byte());
        buf.put_bytes(ERASED_BYTE, 3);
        buf.put_u32_le(crc);
        buf.put_bytes(ERASED_BYTE, format.data_start() - PAGE_HEADER_SIZE);
        buf
    }

    /// Decode the first `PAGE_HEADER_SIZE` bytes of a page
    pub fn decode(bytes: &[u8]) -> PageSlot {
        if bytes.len() < PAGE_HEADER_SIZE {
            return PageSlot::Invalid;
        }
        let bytes = &bytes[..PAGE_HEADER_SIZE];

        if bytes.iter().all(|&b| b == ERASED_BYTE) {
            return PageSlot::Erased;
        }

        if &bytes[0..4] != PAGE_MAGIC {
            return PageSlot::Invalid;
        }

        let mut cursor = &bytes[4..];
        let generation = cursor.get_u32_le();
        let state_byte = cursor.get_u8();
        cursor.advance(3);
        let stored_crc = cursor.get_u32_le();

        if crc32fast::hash(&bytes[..PAGE_STATE_OFFSET]) != stored_crc {
            return PageSlot::Invalid;
        }

        match PageState::from_byte(state_byte) {
            Some(PageState::Erased) | None => PageSlot::Invalid,
            Some(state) => PageSlot::Header(PageHeader { generation, state }),
        }
    }
}
