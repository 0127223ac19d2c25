//! Record header codec

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use super::{Format, RECORD_HEADER_SIZE, RECORD_MARKER};
use crate::backend::ERASED_BYTE;

/// Logical address of a record: (page id, record key)
///
/// The page id is a 16-bit namespace chosen by the caller and has no
/// relation to physical flash pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub page: u16,
    pub record: u16,
}

impl RecordKey {
    pub fn new(page: u16, record: u16) -> Self {
        Self { page, record }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}/{:#06x}", self.page, self.record)
    }
}

/// Slot state of a record copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Current value of its key
    Live,
    /// Superseded by a newer copy
    Stale,
    /// Logically deleted
    Tombstoned,
    /// Never written, or wiped by GC
    Erased,
}

impl RecordState {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0xFE => RecordState::Live,
            0xF8 => RecordState::Tombstoned,
            0xFF => RecordState::Erased,
            // 0xFC and any half-programmed pattern
            _ => RecordState::Stale,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            RecordState::Live => 0xFE,
            RecordState::Stale => 0xFC,
            RecordState::Tombstoned => 0xF8,
            RecordState::Erased => 0xFF,
        }
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub state: RecordState,
    pub key: RecordKey,
    /// Payload length in bytes
    pub len: u16,
    /// Global write sequence, higher is newer
    pub sequence: u32,
    /// CRC32 over key, length, sequence and payload
    pub crc: u32,
}

/// Result of decoding a record header slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSlot {
    /// Marker byte erased: end of the page's log
    Erased,
    /// Marker byte neither erased nor valid
    Garbled,
    Header(RecordHeader),
}

impl RecordHeader {
    /// Decode a `RECORD_HEADER_SIZE` byte header
    pub fn decode(bytes: &[u8]) -> RecordSlot {
        if bytes.len() < RECORD_HEADER_SIZE {
            return RecordSlot::Garbled;
        }

        match bytes[0] {
            ERASED_BYTE => return RecordSlot::Erased,
            RECORD_MARKER => {}
            _ => return RecordSlot::Garbled,
        }

        let state = RecordState::from_byte(bytes[1]);

        let mut cursor = &bytes[4..RECORD_HEADER_SIZE];
        let page = cursor.get_u16_le();
        let record = cursor.get_u16_le();
        let len = cursor.get_u16_le();
        cursor.advance(2);
        let sequence = cursor.get_u32_le();
        let crc = cursor.get_u32_le();

        RecordSlot::Header(RecordHeader {
            state,
            key: RecordKey { page, record },
            len,
            sequence,
            crc,
        })
    }

    /// Check the stored CRC against the payload
    pub fn verify(&self, payload: &[u8]) -> bool {
        payload.len() == self.len as usize
            && compute_crc(self.key, self.len, self.sequence, payload) == self.crc
    }

    pub fn is_live(&self) -> bool {
        self.state == RecordState::Live
    }
}

/// Encode a live record, padded with `0xFF` to the word size
///
/// The caller validates `payload.len()` against the format first.
pub fn encode_record(format: &Format, key: RecordKey, sequence: u32, payload: &[u8]) -> BytesMut {
    let len = payload.len() as u16;
    let footprint = format.footprint(payload.len());

    let mut buf = BytesMut::with_capacity(footprint);
    buf.put_u8(RECORD_MARKER);
    buf.put_u8(RecordState::Live.as_byte());
    buf.put_bytes(ERASED_BYTE, 2);
    buf.put_u16_le(key.page);
    buf.put_u16_le(key.record);
    buf.put_u16_le(len);
    buf.put_bytes(ERASED_BYTE, 2);
    buf.put_u32_le(sequence);
    buf.put_u32_le(compute_crc(key, len, sequence, payload));
    buf.put_slice(payload);
    buf.put_bytes(ERASED_BYTE, footprint - buf.len());
    buf
}

fn compute_crc(key: RecordKey, len: u16, sequence: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&key.page.to_le_bytes());
    hasher.update(&key.record.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(&[ERASED_BYTE; 2]);
    hasher.update(&sequence.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
