//! Busy tracking
//!
//! Records which physical work is in flight and wakes waiters when the
//! store returns to idle. Kept apart from the core lock so `is_busy` never
//! blocks behind a running flash operation.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::GcReport;
use crate::error::Result;

/// Phase of the garbage collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPhase {
    #[default]
    Idle,
    /// Choosing pages to reclaim
    Scanning,
    /// Copying live records into the destination page
    Relocating,
    /// Erasing reclaimed pages
    Erasing,
}

#[derive(Debug, Default)]
struct ActivityState {
    /// A record program or tombstone is in flight
    writing: bool,
    /// A GC pass was requested but the worker has not started it
    gc_queued: bool,
    phase: GcPhase,
    /// Outcome of the last pass, until a waiter collects it
    outcome: Option<Result<GcReport>>,
    /// Report of the last successful pass
    last_report: Option<GcReport>,
}

impl ActivityState {
    fn is_busy(&self) -> bool {
        self.writing || self.gc_queued || self.phase != GcPhase::Idle
    }
}

#[derive(Debug, Default)]
pub(crate) struct Activity {
    state: Mutex<ActivityState>,
    idle: Condvar,
}

impl Activity {
    pub fn is_busy(&self) -> bool {
        self.state.lock().is_busy()
    }

    pub fn gc_in_progress(&self) -> bool {
        let state = self.state.lock();
        state.gc_queued || state.phase != GcPhase::Idle
    }

    pub fn phase(&self) -> GcPhase {
        self.state.lock().phase
    }

    pub fn last_report(&self) -> Option<GcReport> {
        self.state.lock().last_report.clone()
    }

    /// Mark a write in flight until the guard drops
    pub fn begin_write(&self) -> WriteGuard<'_> {
        self.state.lock().writing = true;
        WriteGuard { activity: self }
    }

    /// Request a GC pass; false if one is already queued or running
    pub fn queue_gc(&self) -> bool {
        let mut state = self.state.lock();
        if state.gc_queued || state.phase != GcPhase::Idle {
            return false;
        }
        state.gc_queued = true;
        state.outcome = None;
        true
    }

    pub fn set_phase(&self, phase: GcPhase) {
        let mut state = self.state.lock();
        state.gc_queued = false;
        state.phase = phase;
    }

    /// End the current pass and wake waiters
    pub fn finish_gc(&self, outcome: Result<GcReport>) {
        let mut state = self.state.lock();
        state.gc_queued = false;
        state.phase = GcPhase::Idle;
        if let Ok(report) = &outcome {
            state.last_report = Some(report.clone());
        }
        state.outcome = Some(outcome);
        self.idle.notify_all();
    }

    /// Block until idle, returning the outcome of the last pass once
    pub fn wait_idle(&self) -> Result<Option<GcReport>> {
        let mut state = self.state.lock();
        while state.is_busy() {
            self.idle.wait(&mut state);
        }
        state.outcome.take().transpose()
    }

    /// Like `wait_idle` but gives up after `timeout`; `Ok(false)` on timeout
    pub fn wait_idle_timeout(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.is_busy() {
            if self.idle.wait_until(&mut state, deadline).timed_out() && state.is_busy() {
                return Ok(false);
            }
        }
        state.outcome.take().transpose()?;
        Ok(true)
    }

    /// Forget everything (on init/uninit)
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = ActivityState::default();
        self.idle.notify_all();
    }
}

/// Clears the writing flag on drop
pub(crate) struct WriteGuard<'a> {
    activity: &'a Activity,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.activity.state.lock();
        state.writing = false;
        if !state.is_busy() {
            self.activity.idle.notify_all();
        }
    }
}
