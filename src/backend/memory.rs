//! In-memory flash simulation
//!
//! Behaves like a NOR part: erased bytes read `0xFF`, programs may only
//! clear bits, pages wear out after a configurable number of erases, and
//! each operation can be given a latency so busy states are observable.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{check_program, BackendError, FlashBackend, Geometry, ERASED_BYTE};

/// Tunables for [`MemoryFlash`]
#[derive(Debug, Clone, Default)]
pub struct MemoryFlashOptions {
    /// Time a page erase takes
    pub erase_latency: Duration,

    /// Time a program operation takes
    pub program_latency: Duration,

    /// Erase cycles after which a page refuses further erases
    pub max_erase_cycles: Option<u32>,
}

/// RAM-backed flash device
#[derive(Debug)]
pub struct MemoryFlash {
    geometry: Geometry,
    data: Vec<u8>,
    erase_counts: Vec<u32>,
    options: MemoryFlashOptions,
    faults: FaultInjector,
}

impl MemoryFlash {
    /// Create a fully erased device
    pub fn new(geometry: Geometry) -> Self {
        Self::with_options(geometry, MemoryFlashOptions::default())
    }

    pub fn with_options(geometry: Geometry, options: MemoryFlashOptions) -> Self {
        Self {
            geometry,
            data: vec![ERASED_BYTE; geometry.total_size()],
            erase_counts: vec![0; geometry.page_count as usize],
            options,
            faults: FaultInjector::default(),
        }
    }

    /// Handle for arming faults after the device has been moved into a store
    pub fn fault_injector(&self) -> FaultInjector {
        self.faults.clone()
    }

    /// Number of times `page` has been erased
    pub fn erase_count(&self, page: u32) -> u32 {
        self.erase_counts[page as usize]
    }

    /// Raw contents of one page
    pub fn page(&self, page: u32) -> &[u8] {
        let start = self.geometry.address(page, 0);
        &self.data[start..start + self.geometry.page_size]
    }

    /// Raw contents of the whole device
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Whether every byte of `page` is erased
    pub fn is_page_erased(&self, page: u32) -> bool {
        self.page(page).iter().all(|&b| b == ERASED_BYTE)
    }
}

impl FlashBackend for MemoryFlash {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn erase(&mut self, page: u32) -> Result<(), BackendError> {
        self.geometry.check_range(page, 0, self.geometry.page_size)?;

        if let Some(cycles) = self.options.max_erase_cycles {
            if self.erase_counts[page as usize] >= cycles {
                return Err(BackendError::WornOut { page, cycles });
            }
        }

        if self.faults.trip_erase() {
            // Interrupted erase leaves the first half erased
            let start = self.geometry.address(page, 0);
            let half = self.geometry.page_size / 2;
            self.data[start..start + half].fill(ERASED_BYTE);
            return Err(BackendError::Injected("erase"));
        }

        if !self.options.erase_latency.is_zero() {
            thread::sleep(self.options.erase_latency);
        }

        let start = self.geometry.address(page, 0);
        self.data[start..start + self.geometry.page_size].fill(ERASED_BYTE);
        self.erase_counts[page as usize] += 1;
        Ok(())
    }

    fn program(&mut self, page: u32, offset: usize, data: &[u8]) -> Result<(), BackendError> {
        self.geometry.check_range(page, offset, data.len())?;
        self.geometry.check_aligned(offset, data.len())?;

        let start = self.geometry.address(page, offset);
        check_program(page, offset, &self.data[start..start + data.len()], data)?;

        if self.faults.trip_program() {
            // Torn write: only the leading words reach the cells
            let word = self.geometry.word_size;
            let torn = (data.len() / word / 2) * word;
            self.data[start..start + torn].copy_from_slice(&data[..torn]);
            return Err(BackendError::Injected("program"));
        }

        if !self.options.program_latency.is_zero() {
            thread::sleep(self.options.program_latency);
        }

        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, page: u32, offset: usize, out: &mut [u8]) -> Result<(), BackendError> {
        self.geometry.check_range(page, offset, out.len())?;

        let start = self.geometry.address(page, offset);
        out.copy_from_slice(&self.data[start..start + out.len()]);
        Ok(())
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

/// Shared switch for failing the N-th program or erase of a [`MemoryFlash`]
///
/// Counters are disarmed at `-1`. Arming with `n` lets `n` operations
/// succeed and fails the next one, after which the counter disarms itself.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    state: Arc<FaultState>,
}

#[derive(Debug)]
struct FaultState {
    program_countdown: AtomicI64,
    erase_countdown: AtomicI64,
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self {
            state: Arc::new(FaultState {
                program_countdown: AtomicI64::new(-1),
                erase_countdown: AtomicI64::new(-1),
            }),
        }
    }
}

impl FaultInjector {
    /// Fail the program operation after `n` successful ones
    pub fn fail_program_after(&self, n: u32) {
        self.state
            .program_countdown
            .store(i64::from(n), Ordering::SeqCst);
    }

    /// Fail the erase operation after `n` successful ones
    pub fn fail_erase_after(&self, n: u32) {
        self.state.erase_countdown.store(i64::from(n), Ordering::SeqCst);
    }

    /// Disarm all pending faults
    pub fn clear(&self) {
        self.state.program_countdown.store(-1, Ordering::SeqCst);
        self.state.erase_countdown.store(-1, Ordering::SeqCst);
    }

    fn trip_program(&self) -> bool {
        Self::trip(&self.state.program_countdown)
    }

    fn trip_erase(&self) -> bool {
        Self::trip(&self.state.erase_countdown)
    }

    fn trip(counter: &AtomicI64) -> bool {
        let previous = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            if v < 0 {
                None
            } else {
                Some(v - 1)
            }
        });

        // Reaching -1 from 0 fires the fault and leaves the counter disarmed
        matches!(previous, Ok(0))
    }
}
