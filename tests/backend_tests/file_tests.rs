//! Tests for FileFlash

use flashrec::backend::{BackendError, FileFlash, FlashBackend, Geometry, ERASED_BYTE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn geometry() -> Geometry {
    Geometry::new(512, 4, 4)
}

// =============================================================================
// Image Tests
// =============================================================================

#[test]
fn test_create_writes_erased_image() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flash.img");

    let mut flash = FileFlash::create(&path, geometry()).unwrap();

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 2048);
    assert_eq!(flash.path(), path.as_path());

    let mut out = vec![0u8; 512];
    flash.read(3, 0, &mut out).unwrap();
    assert!(out.iter().all(|&b| b == ERASED_BYTE));
}

#[test]
fn test_contents_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flash.img");

    {
        let mut flash = FileFlash::create(&path, geometry())
            .unwrap()
            .with_sync_writes(true);
        flash.program(2, 64, b"persist!").unwrap();
    }

    let mut flash = FileFlash::open(&path, geometry()).unwrap();
    let mut out = [0u8; 8];
    flash.read(2, 64, &mut out).unwrap();
    assert_eq!(&out, b"persist!");
}

#[test]
fn test_open_rejects_size_mismatch() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flash.img");
    FileFlash::create(&path, geometry()).unwrap();

    let result = FileFlash::open(&path, Geometry::new(512, 8, 4));

    assert!(matches!(result, Err(BackendError::Io(_))));
}

#[test]
fn test_open_missing_file_fails() {
    let temp = TempDir::new().unwrap();

    let result = FileFlash::open(&temp.path().join("missing.img"), geometry());

    assert!(matches!(result, Err(BackendError::Io(_))));
}

#[test]
fn test_open_or_create() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flash.img");

    {
        let mut flash = FileFlash::open_or_create(&path, geometry()).unwrap();
        flash.program(0, 0, &[1, 2, 3, 4]).unwrap();
    }

    let mut flash = FileFlash::open_or_create(&path, geometry()).unwrap();
    let mut out = [0u8; 4];
    flash.read(0, 0, &mut out).unwrap();
    assert_eq!(out, [1, 2, 3, 4]);
}

// =============================================================================
// NOR Rule Tests
// =============================================================================

#[test]
fn test_program_conflict_detected() {
    let temp = TempDir::new().unwrap();
    let mut flash = FileFlash::create(&temp.path().join("flash.img"), geometry()).unwrap();

    flash.program(1, 0, &[0xF0, 0xF0, 0xF0, 0xF0]).unwrap();
    flash.program(1, 0, &[0xA0, 0xF0, 0xF0, 0xF0]).unwrap();
    let result = flash.program(1, 0, &[0xA0, 0xFF, 0xF0, 0xF0]);

    assert_eq!(
        result,
        Err(BackendError::ProgramConflict { page: 1, offset: 1 })
    );
}

#[test]
fn test_erase_restores_page() {
    let temp = TempDir::new().unwrap();
    let mut flash = FileFlash::create(&temp.path().join("flash.img"), geometry()).unwrap();

    flash.program(1, 0, &[0u8; 512]).unwrap();
    flash.erase(1).unwrap();
    flash.program(1, 0, &[0x12, 0x34, 0x56, 0x78]).unwrap();

    let mut out = [0u8; 8];
    flash.read(1, 0, &mut out).unwrap();
    assert_eq!(out, [0x12, 0x34, 0x56, 0x78, 0xFF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_alignment_and_bounds() {
    let temp = TempDir::new().unwrap();
    let mut flash = FileFlash::create(&temp.path().join("flash.img"), geometry()).unwrap();

    assert!(matches!(
        flash.program(0, 1, &[0u8; 4]),
        Err(BackendError::NotAligned { .. })
    ));
    assert!(matches!(
        flash.erase(4),
        Err(BackendError::OutOfBounds { .. })
    ));
}
