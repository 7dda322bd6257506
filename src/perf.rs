//! Performance tracking: a fixed-size ring of recent round timings (§4.8).
//!
//! Each pipeline round emits exactly one slot, either via
//! [`PerfGuard::emit_action`] or [`PerfGuard::emit_no_action`]. The guard is
//! idempotent — calling either emit method a second time, or dropping the
//! guard after one fired, does not push a second slot.

use std::sync::Mutex;
use std::time::Instant;

const RING_CAPACITY: usize = 50;

/// One recorded round: how long it took, and whether it produced an action.
#[derive(Debug, Clone, Copy)]
pub struct PerfSlot {
    pub duration_ms: u64,
    pub produced_action: bool,
}

/// A fixed-capacity ring buffer of the most recent [`PerfSlot`]s.
pub struct PerfTracker {
    slots: Mutex<Vec<PerfSlot>>,
}

impl Default for PerfTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PerfTracker {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(RING_CAPACITY)),
        }
    }

    fn push(&self, slot: PerfSlot) {
        let mut slots = self.slots.lock().expect("perf tracker mutex poisoned");
        if slots.len() == RING_CAPACITY {
            slots.remove(0);
        }
        slots.push(slot);
    }

    /// Snapshot of all currently retained slots, oldest first.
    pub fn snapshot(&self) -> Vec<PerfSlot> {
        self.slots.lock().expect("perf tracker mutex poisoned").clone()
    }

    /// Start timing one round.
    pub fn start(&self) -> PerfGuard<'_> {
        PerfGuard {
            tracker: self,
            started_at: Instant::now(),
            emitted: false,
        }
    }
}

/// RAII timer for one round. Exactly one of [`emit_action`](Self::emit_action)
/// or [`emit_no_action`](Self::emit_no_action) should be called; further
/// calls, or dropping without calling either, are no-ops beyond the first.
pub struct PerfGuard<'a> {
    tracker: &'a PerfTracker,
    started_at: Instant,
    emitted: bool,
}

impl PerfGuard<'_> {
    pub fn emit_action(&mut self) {
        self.emit(true);
    }

    pub fn emit_no_action(&mut self) {
        self.emit(false);
    }

    fn emit(&mut self, produced_action: bool) {
        if self.emitted {
            return;
        }
        self.emitted = true;
        let duration_ms = self.started_at.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        self.tracker.push(PerfSlot {
            duration_ms,
            produced_action,
        });
    }
}
