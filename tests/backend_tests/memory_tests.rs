//! Tests for MemoryFlash
//!
//! These tests verify:
//! - NOR semantics (erase to 0xFF, programs only clear bits)
//! - Bounds and alignment checks
//! - Wear limits and fault injection

use flashrec::backend::{
    BackendError, FlashBackend, Geometry, MemoryFlash, MemoryFlashOptions, ERASED_BYTE,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn small_flash() -> MemoryFlash {
    MemoryFlash::new(Geometry::new(256, 4, 4))
}

fn read_vec(flash: &mut MemoryFlash, page: u32, offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    flash.read(page, offset, &mut out).unwrap();
    out
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_new_device_is_erased() {
    let flash = small_flash();

    assert_eq!(flash.raw().len(), 1024);
    assert!(flash.raw().iter().all(|&b| b == ERASED_BYTE));
    for page in 0..4 {
        assert!(flash.is_page_erased(page));
        assert_eq!(flash.erase_count(page), 0);
    }
}

#[test]
fn test_program_and_read() {
    let mut flash = small_flash();

    flash.program(1, 8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    assert_eq!(read_vec(&mut flash, 1, 8, 8), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(read_vec(&mut flash, 1, 0, 8), vec![ERASED_BYTE; 8]);
    assert!(flash.is_page_erased(0));
    assert!(!flash.is_page_erased(1));
}

#[test]
fn test_program_clears_bits_in_place() {
    let mut flash = small_flash();

    flash.program(0, 0, &[0x5A, 0xFE, 0xFF, 0xFF]).unwrap();
    flash.program(0, 0, &[0x5A, 0xFC, 0xFF, 0xFF]).unwrap();

    assert_eq!(read_vec(&mut flash, 0, 0, 4), vec![0x5A, 0xFC, 0xFF, 0xFF]);
}

#[test]
fn test_program_cannot_set_bits() {
    let mut flash = small_flash();

    flash.program(0, 4, &[0x00, 0x00, 0x00, 0x00]).unwrap();
    let result = flash.program(0, 4, &[0x00, 0x01, 0x00, 0x00]);

    assert_eq!(
        result,
        Err(BackendError::ProgramConflict { page: 0, offset: 5 })
    );
    assert_eq!(read_vec(&mut flash, 0, 4, 4), vec![0, 0, 0, 0]);
}

#[test]
fn test_erase_resets_page() {
    let mut flash = small_flash();

    flash.program(2, 0, &[0u8; 16]).unwrap();
    flash.program(3, 0, &[0u8; 16]).unwrap();
    flash.erase(2).unwrap();

    assert!(flash.is_page_erased(2));
    assert!(!flash.is_page_erased(3));
    assert_eq!(flash.erase_count(2), 1);
    assert_eq!(flash.erase_count(3), 0);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_unaligned_program_rejected() {
    let mut flash = small_flash();

    assert!(matches!(
        flash.program(0, 2, &[0u8; 4]),
        Err(BackendError::NotAligned { offset: 2, .. })
    ));
    assert!(matches!(
        flash.program(0, 0, &[0u8; 3]),
        Err(BackendError::NotAligned { len: 3, .. })
    ));
    assert!(flash.is_page_erased(0));
}

#[test]
fn test_out_of_bounds_rejected() {
    let mut flash = small_flash();
    let mut out = [0u8; 8];

    assert!(matches!(
        flash.read(4, 0, &mut out),
        Err(BackendError::OutOfBounds { page: 4, .. })
    ));
    assert!(matches!(
        flash.read(0, 252, &mut out),
        Err(BackendError::OutOfBounds { .. })
    ));
    assert!(matches!(
        flash.program(0, 252, &[0u8; 8]),
        Err(BackendError::OutOfBounds { .. })
    ));
    assert!(matches!(
        flash.erase(9),
        Err(BackendError::OutOfBounds { page: 9, .. })
    ));
}

#[test]
fn test_wear_limit() {
    let options = MemoryFlashOptions {
        max_erase_cycles: Some(2),
        ..Default::default()
    };
    let mut flash = MemoryFlash::with_options(Geometry::new(256, 4, 4), options);

    flash.erase(0).unwrap();
    flash.erase(0).unwrap();
    let result = flash.erase(0);

    assert_eq!(result, Err(BackendError::WornOut { page: 0, cycles: 2 }));
    assert_eq!(flash.erase_count(0), 2);
    flash.erase(1).unwrap();
}

// =============================================================================
// Fault Injection Tests
// =============================================================================

#[test]
fn test_injected_program_fault_tears_write() {
    let mut flash = small_flash();
    let faults = flash.fault_injector();

    faults.fail_program_after(1);
    flash.program(0, 0, &[0u8; 8]).unwrap();
    let result = flash.program(0, 16, &[0u8; 16]);

    assert_eq!(result, Err(BackendError::Injected("program")));
    // Leading half of the words landed
    assert_eq!(read_vec(&mut flash, 0, 16, 8), vec![0u8; 8]);
    assert_eq!(read_vec(&mut flash, 0, 24, 8), vec![ERASED_BYTE; 8]);

    // Fault fires once, then disarms
    flash.program(0, 32, &[0u8; 4]).unwrap();
}

#[test]
fn test_injected_erase_fault_is_partial() {
    let mut flash = small_flash();
    let faults = flash.fault_injector();

    flash.program(1, 0, &[0u8; 256]).unwrap();
    faults.fail_erase_after(0);

    assert_eq!(flash.erase(1), Err(BackendError::Injected("erase")));
    assert!(!flash.is_page_erased(1));
    assert_eq!(read_vec(&mut flash, 1, 0, 4), vec![ERASED_BYTE; 4]);
    assert_eq!(read_vec(&mut flash, 1, 252, 4), vec![0u8; 4]);

    flash.erase(1).unwrap();
    assert!(flash.is_page_erased(1));
}

#[test]
fn test_fault_injector_clear() {
    let mut flash = small_flash();
    let faults = flash.fault_injector();

    faults.fail_program_after(0);
    faults.fail_erase_after(0);
    faults.clear();

    flash.program(0, 0, &[0u8; 4]).unwrap();
    flash.erase(0).unwrap();
}

#[test]
fn test_boxed_backend_delegates() {
    let mut flash: Box<dyn FlashBackend> = Box::new(small_flash());

    assert_eq!(flash.geometry(), Geometry::new(256, 4, 4));
    flash.program(0, 0, &[7, 7, 7, 7]).unwrap();

    let mut out = [0u8; 4];
    flash.read(0, 0, &mut out).unwrap();
    assert_eq!(out, [7, 7, 7, 7]);
}
