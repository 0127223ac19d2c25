//! # flashrec
//!
//! A key/value record store for raw erasable flash with:
//! - Append-only record log, superseded copies marked stale in place
//! - Tombstone deletes, space reclaimed by background garbage collection
//! - Power-loss safe GC through a reserved swap page
//! - Index rebuilt from flash on mount
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FlashStorage                            │
//! │       record_set / record_get / record_delete / gc_run       │
//! └──────────┬──────────────────────┬───────────────────────────┘
//!            │                      │
//!            ▼                      ▼
//!   ┌─────────────────┐    ┌─────────────────┐
//!   │   RecordIndex   │    │    GC worker    │
//!   │ (key → location)│    │    (thread)     │
//!   └─────────────────┘    └────────┬────────┘
//!                                   │
//!            ┌──────────────────────┘
//!            ▼
//!   ┌─────────────────┐    ┌─────────────────┐
//!   │     Layout      │───►│  FlashBackend   │
//!   │ (pages/records) │    │ (memory / file) │
//!   └─────────────────┘    └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use flashrec::{Config, FlashStorage, Geometry, MemoryFlash};
//!
//! let flash = MemoryFlash::new(Geometry::new(4096, 8, 4));
//! let storage = FlashStorage::new(flash, Config::default());
//! storage.init().unwrap();
//!
//! storage.record_set(0x0002, 0x0001, b"Flash test data 2").unwrap();
//! let mut out = [0u8; 64];
//! let n = storage.record_get(0x0002, 0x0001, &mut out).unwrap();
//! assert_eq!(&out[..n], b"Flash test data 2");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod backend;
pub mod layout;
pub mod index;
pub mod storage;
pub mod snapshot;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FlashError, Result, Status};
pub use config::{Config, ConfigBuilder};
pub use backend::{BackendError, FileFlash, FlashBackend, Geometry, MemoryFlash};
pub use layout::RecordKey;
pub use storage::{FlashStorage, GcPhase, GcReport, StorageStats};
pub use snapshot::{Snapshot, SnapshotRecord};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flashrec
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
