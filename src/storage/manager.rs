//! Flash Storage Manager
//!
//! Public entry point: lifecycle, record CRUD, free space and busy state.
//!
//! ## Responsibilities
//! - Mount the partition on `init()`, drop in-memory state on `uninit()`
//! - Append, supersede, read and tombstone records
//! - Hand GC passes to the background worker
//! - Report free space and busy state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use super::activity::{Activity, GcPhase};
use super::ops::{program_verified, read_payload, set_record_state, write_page_header};
use super::pages::{PageRole, PageTable};
use super::{gc, mount, GcReport, StorageStats};
use crate::backend::FlashBackend;
use crate::config::{Config, Partition};
use crate::error::{FlashError, Result};
use crate::index::{IndexEntry, Location, RecordIndex};
use crate::layout::{encode_record, PageState, RecordKey, RecordState};

/// In-memory state of a mounted store
#[derive(Debug)]
pub(crate) struct Mounted {
    pub partition: Partition,
    pub pages: PageTable,
    pub index: RecordIndex,
    /// Sequence number for the next record written; past `u32::MAX` the
    /// store refuses writes
    pub next_sequence: u64,
}

/// Everything guarded by the core lock
pub(crate) struct Core<B> {
    pub backend: B,
    /// None while uninitialized
    pub mounted: Option<Mounted>,
    /// Job queue of the GC worker, present while initialized
    jobs: Option<Sender<Job>>,
}

/// State shared with the GC worker
pub(crate) struct Shared<B> {
    pub core: Mutex<Core<B>>,
    pub activity: Activity,
    pub config: Config,
    /// Mirrors `core.mounted.is_some()` without taking the core lock
    initialized: AtomicBool,
}

/// Work handed to the GC worker
#[derive(Debug)]
pub(crate) enum Job {
    Collect,
    Shutdown,
}

/// Flash record store
///
/// ## Concurrency Model
///
/// - **Physical I/O**: one operation at a time, serialized by the core lock
/// - **Writes** (`record_set`/`record_delete`): run on the caller's thread,
///   busy while the program is in flight, rejected with `Busy` during GC
/// - **GC**: runs on a dedicated worker thread, one page per lock hold so
///   reads and status queries interleave with it
/// - **Busy state**: tracked outside the core lock, never blocks
pub struct FlashStorage<B: FlashBackend + 'static> {
    shared: Arc<Shared<B>>,

    /// GC worker thread, present while initialized
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<B: FlashBackend + 'static> FlashStorage<B> {
    /// Create an uninitialized store over `backend`; no flash is touched
    pub fn new(backend: B, config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    backend,
                    mounted: None,
                    jobs: None,
                }),
                activity: Activity::default(),
                config,
                initialized: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Create with the default config
    pub fn with_defaults(backend: B) -> Self {
        Self::new(backend, Config::default())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Mount the partition and start the GC worker
    ///
    /// Fails with `InvalidState` if already initialized.
    pub fn init(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        let mut core = self.shared.core.lock();

        if core.mounted.is_some() {
            return Err(FlashError::InvalidState(
                "storage is already initialized".to_string(),
            ));
        }

        let partition = self.shared.config.resolve(&core.backend.geometry())?;
        let mounted = mount::mount(&mut core.backend, partition)?;

        let (sender, receiver) = channel::unbounded();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.shared.config.worker_name.clone())
            .spawn(move || {
                for job in receiver {
                    match job {
                        Job::Collect => gc::run_pass(&shared),
                        Job::Shutdown => break,
                    }
                }
                tracing::debug!("GC worker stopped");
            })
            .map_err(|e| FlashError::InvalidState(format!("failed to start GC worker: {}", e)))?;

        core.mounted = Some(mounted);
        core.jobs = Some(sender);
        *worker = Some(handle);

        self.shared.activity.reset();
        self.shared.initialized.store(true, Ordering::SeqCst);

        tracing::info!("Flash storage initialized");
        Ok(())
    }

    /// Return to the uninitialized state
    ///
    /// Lets a running GC pass finish, then stops the worker. Always
    /// succeeds, also before `init()`. Flash contents are kept.
    pub fn uninit(&self) -> Result<()> {
        let mut worker = self.worker.lock();

        if !self.shared.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.shared.activity.wait_idle() {
            tracing::warn!("Last GC pass failed before uninit: {}", e);
        }

        let jobs = self.shared.core.lock().jobs.take();
        if let Some(jobs) = jobs {
            // The worker may already be gone if it panicked
            let _ = jobs.send(Job::Shutdown);
        }
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::error!("GC worker panicked");
            }
        }

        self.shared.core.lock().mounted = None;
        self.shared.initialized.store(false, Ordering::SeqCst);
        self.shared.activity.reset();

        tracing::info!("Flash storage uninitialized");
        Ok(())
    }

    /// Whether `init()` has succeeded and `uninit()` has not been called
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// Uninitialize and hand back the flash device
    pub fn into_backend(self) -> Result<B> {
        let shared = Arc::clone(&self.shared);
        drop(self);

        match Arc::try_unwrap(shared) {
            Ok(shared) => Ok(shared.core.into_inner().backend),
            Err(_) => Err(FlashError::InvalidState(
                "flash device is still shared".to_string(),
            )),
        }
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Write or supersede the record at (page, key)
    ///
    /// The length is checked before any flash is touched. The superseded
    /// copy is marked stale only after the new copy is written.
    pub fn record_set(&self, page: u16, key: u16, data: &[u8]) -> Result<()> {
        let key = RecordKey::new(page, key);
        let verify = self.shared.config.verify_writes;

        // Fast path: don't queue behind a GC page step for the core lock
        if self.shared.activity.gc_in_progress() {
            return Err(FlashError::Busy);
        }

        let mut core = self.shared.core.lock();
        let Core {
            backend,
            mounted,
            jobs,
        } = &mut *core;
        let m = mounted.as_mut().ok_or(FlashError::NotInitialized)?;

        let max = m.partition.max_record_len;
        if data.len() > max {
            return Err(FlashError::DataSize {
                len: data.len(),
                max,
            });
        }

        if self.shared.activity.gc_in_progress() {
            return Err(FlashError::Busy);
        }

        // Sequences never wrap
        let sequence = u32::try_from(m.next_sequence).map_err(|_| {
            FlashError::InvalidState("record sequence numbers exhausted".to_string())
        })?;

        let format = m.partition.format;
        let footprint = format.footprint(data.len());

        let (target, needs_claim) = match m.pages.allocate(footprint) {
            Some(slot) => slot,
            None => return Err(self.exhausted(m, jobs.as_ref(), footprint)),
        };

        let _busy = self.shared.activity.begin_write();

        // Step 1: Claim a fresh page if the active one is full
        if needs_claim {
            let generation = m.pages.next_generation();
            if let Err(e) =
                write_page_header(backend, &format, target, generation, PageState::Data)
            {
                tracing::error!("Failed to claim page {}: {}", target, e);
                m.pages.mark_dirty(target);
                return Err(e);
            }
            m.pages.claim_active(target, generation);
            tracing::debug!("Claimed page {} (generation {})", target, generation);
        }

        // Step 2: Append the new copy
        let location = Location::new(target, m.pages.cursor(target));
        let encoded = encode_record(&format, key, sequence, data);

        m.next_sequence += 1;
        if let Err(e) = program_verified(backend, location, &encoded, verify) {
            tracing::error!("Failed to write record {}: {}", key, e);
            m.pages.seal(target);
            return Err(e);
        }
        m.pages.advance(target, footprint);

        // Step 3: Point the index at it and retire the old copy
        let entry = IndexEntry {
            location,
            len: data.len() as u16,
            sequence,
            footprint,
        };
        m.pages.add_live(target, footprint);

        if let Some(old) = m.index.insert(key, entry) {
            m.pages.release_live(old.location.page, old.footprint);
            set_record_state(backend, &format, old.location, RecordState::Stale)?;
        }

        tracing::debug!(
            "Stored record {} ({} bytes) at page {} offset {}",
            key,
            data.len(),
            location.page,
            location.offset
        );
        Ok(())
    }

    /// Copy up to `out.len()` bytes of the record at (page, key)
    ///
    /// Returns the number of bytes copied.
    pub fn record_get(&self, page: u16, key: u16, out: &mut [u8]) -> Result<usize> {
        let payload = self.record_read(page, key)?;
        let n = payload.len().min(out.len());
        out[..n].copy_from_slice(&payload[..n]);
        Ok(n)
    }

    /// Read the whole payload of the record at (page, key)
    pub fn record_read(&self, page: u16, key: u16) -> Result<Bytes> {
        let key = RecordKey::new(page, key);

        let mut core = self.shared.core.lock();
        let Core {
            backend, mounted, ..
        } = &mut *core;
        let m = mounted.as_ref().ok_or(FlashError::NotInitialized)?;

        let entry = m.index.get(&key).ok_or(FlashError::NotFound)?;
        read_payload(backend, key, entry)
    }

    /// Payload length of the record at (page, key)
    pub fn record_len(&self, page: u16, key: u16) -> Result<usize> {
        let key = RecordKey::new(page, key);
        self.with_mounted(|m| {
            m.index
                .get(&key)
                .map(|entry| entry.len as usize)
                .ok_or(FlashError::NotFound)
        })
    }

    /// Whether a live record exists at (page, key)
    pub fn contains(&self, page: u16, key: u16) -> Result<bool> {
        let key = RecordKey::new(page, key);
        self.with_mounted(|m| Ok(m.index.contains(&key)))
    }

    /// Tombstone the record at (page, key)
    ///
    /// Space is reclaimed by the next GC pass.
    pub fn record_delete(&self, page: u16, key: u16) -> Result<()> {
        let key = RecordKey::new(page, key);
        if self.shared.activity.gc_in_progress() {
            return Err(FlashError::Busy);
        }

        let mut core = self.shared.core.lock();
        let Core {
            backend, mounted, ..
        } = &mut *core;
        let m = mounted.as_mut().ok_or(FlashError::NotInitialized)?;

        if self.shared.activity.gc_in_progress() {
            return Err(FlashError::Busy);
        }

        let entry = *m.index.get(&key).ok_or(FlashError::NotFound)?;
        let format = m.partition.format;

        let _busy = self.shared.activity.begin_write();
        set_record_state(backend, &format, entry.location, RecordState::Tombstoned)?;

        m.index.remove(&key);
        m.pages.release_live(entry.location.page, entry.footprint);

        tracing::debug!("Deleted record {}", key);
        Ok(())
    }

    /// Keys of all live records in ascending order
    pub fn records(&self) -> Result<Vec<RecordKey>> {
        self.with_mounted(|m| Ok(m.index.keys().copied().collect()))
    }

    // =========================================================================
    // Garbage Collection & Busy State
    // =========================================================================

    /// Queue a GC pass on the worker thread
    ///
    /// Returns immediately; poll `is_busy()` or call `wait_idle()` for
    /// completion. A no-op if a pass is already queued or running.
    pub fn gc_run(&self) -> Result<()> {
        let core = self.shared.core.lock();
        if core.mounted.is_none() {
            return Err(FlashError::NotInitialized);
        }

        self.queue_gc(core.jobs.as_ref())
    }

    /// Whether a write or GC pass is in flight; false while uninitialized
    pub fn is_busy(&self) -> bool {
        self.is_initialized() && self.shared.activity.is_busy()
    }

    /// Like `is_busy` but fails with `NotInitialized` before `init()`
    pub fn check_busy(&self) -> Result<bool> {
        if !self.is_initialized() {
            return Err(FlashError::NotInitialized);
        }
        Ok(self.shared.activity.is_busy())
    }

    /// Block until idle
    ///
    /// Returns the report of a GC pass that finished since the last call,
    /// or the fatal error it ended with.
    pub fn wait_idle(&self) -> Result<Option<GcReport>> {
        if !self.is_initialized() {
            return Err(FlashError::NotInitialized);
        }
        self.shared.activity.wait_idle()
    }

    /// Block until idle or `timeout` elapses; `Ok(false)` on timeout
    pub fn wait_idle_timeout(&self, timeout: Duration) -> Result<bool> {
        if !self.is_initialized() {
            return Err(FlashError::NotInitialized);
        }
        self.shared.activity.wait_idle_timeout(timeout)
    }

    /// Current collector phase
    pub fn gc_phase(&self) -> GcPhase {
        self.shared.activity.phase()
    }

    /// Report of the last successful GC pass
    pub fn last_gc_report(&self) -> Option<GcReport> {
        self.shared.activity.last_report()
    }

    // =========================================================================
    // Space Accounting
    // =========================================================================

    /// Bytes writable without GC, record headers included
    ///
    /// During a GC pass only pages already erased are counted.
    pub fn free_size_get(&self) -> Result<usize> {
        self.with_mounted(|m| Ok(m.pages.free_size()))
    }

    /// Largest payload accepted by `record_set`
    pub fn max_record_len(&self) -> Result<usize> {
        self.with_mounted(|m| Ok(m.partition.max_record_len))
    }

    /// Flash bytes a record with `len` payload bytes occupies
    pub fn record_footprint(&self, len: usize) -> Result<usize> {
        self.with_mounted(|m| Ok(m.partition.format.footprint(len)))
    }

    /// Snapshot of page and record accounting
    pub fn stats(&self) -> Result<StorageStats> {
        self.with_mounted(|m| {
            Ok(StorageStats {
                page_count: m.partition.page_count,
                data_pages: m.pages.count(PageRole::Data),
                free_pages: m.pages.count(PageRole::Free),
                swap_page: m.pages.swap(),
                active_page: m.pages.active(),
                live_records: m.index.len(),
                live_bytes: m.pages.live_bytes(),
                garbage_bytes: m.pages.reclaimable(),
                free_bytes: m.pages.free_size(),
            })
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn with_mounted<R>(&self, f: impl FnOnce(&Mounted) -> Result<R>) -> Result<R> {
        let core = self.shared.core.lock();
        let m = core.mounted.as_ref().ok_or(FlashError::NotInitialized)?;
        f(m)
    }

    fn queue_gc(&self, jobs: Option<&Sender<Job>>) -> Result<()> {
        if !self.shared.activity.queue_gc() {
            tracing::debug!("GC already in progress");
            return Ok(());
        }

        let sent = jobs.map_or(false, |jobs| jobs.send(Job::Collect).is_ok());
        if !sent {
            self.shared.activity.reset();
            return Err(FlashError::InvalidState("GC worker is not running".to_string()));
        }

        tracing::debug!("GC pass queued");
        Ok(())
    }

    /// Error for a write that found no room
    fn exhausted(&self, m: &Mounted, jobs: Option<&Sender<Job>>, footprint: usize) -> FlashError {
        let available = m.pages.free_size();

        if self.shared.config.gc_on_exhaustion && m.pages.reclaimable() > 0 {
            tracing::debug!(
                "Out of space for {} bytes, starting GC ({} bytes reclaimable)",
                footprint,
                m.pages.reclaimable()
            );
            return match self.queue_gc(jobs) {
                Ok(()) => FlashError::Busy,
                Err(e) => e,
            };
        }

        FlashError::OutOfSpace {
            needed: footprint,
            available,
        }
    }
}

impl<B: FlashBackend + 'static> Drop for FlashStorage<B> {
    fn drop(&mut self) {
        let _ = self.uninit();
    }
}
