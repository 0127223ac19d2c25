//! Tests for stores on flash image files
//!
//! These tests verify:
//! - Records, tombstones and GC results survive reopening the image
//! - A reopened store reports the same accounting

use std::path::Path;

use flashrec::backend::{FileFlash, Geometry};
use flashrec::{Config, FlashError, FlashStorage};
use tempfile::tempdir;

// =============================================================================
// Helper Functions
// =============================================================================

fn geometry() -> Geometry {
    Geometry::new(512, 6, 4)
}

fn open(path: &Path) -> FlashStorage<FileFlash> {
    let flash = FileFlash::open_or_create(path, geometry()).unwrap();
    let storage = FlashStorage::new(flash, Config::default());
    storage.init().unwrap();
    storage
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flash.img");

    {
        let storage = open(&path);
        storage.record_set(0x0002, 0x0001, b"Flash test data 2").unwrap();
        storage.record_set(0x0003, 0x0001, b"doomed").unwrap();
        storage.record_delete(0x0003, 0x0001).unwrap();
    }

    let storage = open(&path);

    assert_eq!(&storage.record_read(0x0002, 0x0001).unwrap()[..], b"Flash test data 2");
    assert_eq!(storage.record_read(0x0003, 0x0001), Err(FlashError::NotFound));
}

#[test]
fn test_gc_result_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flash.img");

    let (stats, free) = {
        let storage = open(&path);
        for round in 0..20u8 {
            storage.record_set(1, 1, &[round; 100]).unwrap();
        }
        storage.record_set(1, 2, b"second").unwrap_err();
        storage.wait_idle().unwrap();
        storage.record_set(1, 2, b"second").unwrap();
        (storage.stats().unwrap(), storage.free_size_get().unwrap())
    };

    let storage = open(&path);

    assert_eq!(storage.record_read(1, 1).unwrap(), vec![19u8; 100]);
    assert_eq!(&storage.record_read(1, 2).unwrap()[..], b"second");
    assert_eq!(storage.free_size_get().unwrap(), free);
    let reopened = storage.stats().unwrap();
    assert_eq!(reopened.live_records, stats.live_records);
    assert_eq!(reopened.data_pages, stats.data_pages);
    assert_eq!(reopened.garbage_bytes, 0);
}

#[test]
fn test_image_size_checked() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flash.img");
    FileFlash::create(&path, geometry()).unwrap();

    let result = FileFlash::open(&path, Geometry::new(512, 8, 4));

    assert!(result.is_err());
}

#[test]
fn test_synced_image() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flash.img");

    {
        let flash = FileFlash::create(&path, geometry())
            .unwrap()
            .with_sync_writes(true);
        let storage = FlashStorage::with_defaults(flash);
        storage.init().unwrap();
        storage.record_set(7, 7, b"synced").unwrap();
        let flash = storage.into_backend().unwrap();
        assert_eq!(flash.path(), path.as_path());
    }

    let storage = open(&path);
    assert_eq!(&storage.record_read(7, 7).unwrap()[..], b"synced");
}
