//! Snapshot export/import
//!
//! Portable copy of every live record, independent of page layout. Used to
//! move a store between devices or geometries.

use serde::{Deserialize, Serialize};

use crate::backend::FlashBackend;
use crate::error::{FlashError, Result};
use crate::layout::RecordKey;
use crate::storage::FlashStorage;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Attempts per record when a write hits a GC pass
const IMPORT_RETRIES: usize = 3;

/// All live records of a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub records: Vec<SnapshotRecord>,
}

/// One record in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub key: RecordKey,
    pub data: Vec<u8>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize with bincode
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| FlashError::Serialization(e.to_string()))
    }

    /// Deserialize, rejecting unknown versions
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot =
            bincode::deserialize(bytes).map_err(|e| FlashError::Serialization(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(FlashError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

impl<B: FlashBackend + 'static> FlashStorage<B> {
    /// Copy every live record into a snapshot, in key order
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();

        for key in self.records()? {
            let data = self.record_read(key.page, key.record)?;
            snapshot.records.push(SnapshotRecord {
                key,
                data: data.to_vec(),
            });
        }

        tracing::info!("Exported {} records", snapshot.len());
        Ok(snapshot)
    }

    /// Write every record of a snapshot through `record_set`
    ///
    /// Waits out GC passes triggered by the import itself. Returns the
    /// number of records written.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<usize> {
        for record in &snapshot.records {
            self.import_record(record)?;
        }

        tracing::info!("Imported {} records", snapshot.len());
        Ok(snapshot.len())
    }

    fn import_record(&self, record: &SnapshotRecord) -> Result<()> {
        let key = record.key;
        let mut attempts = 0;

        loop {
            match self.record_set(key.page, key.record, &record.data) {
                Err(FlashError::Busy) if attempts < IMPORT_RETRIES => {
                    attempts += 1;
                    self.wait_idle()?;
                }
                other => return other,
            }
        }
    }
}
