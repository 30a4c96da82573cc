//! Process-wide day-clock and RMD uniqueness state.
//!
//! `_lastReportedMicros`-style state belongs to the inventory manager, not
//! to any one instruction processor: every processor executing `RMD`
//! shares the same (last-observed-microsecond, uniqueness-counter) pair so
//! that two processors reading the clock in the same microsecond still
//! get distinct results. [`DayClock`] is a cheap handle (`Arc<Mutex<_>>`)
//! the inventory manager constructs once and clones into each processor.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::word::WORD_MASK;

struct DayClockState {
    /// Added to the wall-clock microsecond reading before masking to 36
    /// bits, so the emulated clock can be set independently of host time.
    offset: i64,
    last_micros: u64,
    uniqueness: u32,
}

/// A shared handle onto the process-wide day-clock and RMD uniqueness
/// state. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct DayClock(Arc<Mutex<DayClockState>>);

impl Default for DayClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DayClock {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(DayClockState { offset: 0, last_micros: 0, uniqueness: 0 })))
    }

    pub fn set_offset(&self, offset: i64) {
        self.0.lock().expect("dayclock mutex poisoned").offset = offset;
    }

    /// Read the clock at `now_micros`, advancing the uniqueness counter
    /// under the same lock the read happens under so concurrent
    /// processors never observe the same (micros, counter) pair.
    ///
    /// Returns the 41-bit RMD result: the adjusted 36-bit microsecond
    /// count shifted left 5 bits, OR'd with a 5-bit uniqueness counter.
    pub fn read_at(&self, now_micros: u64) -> u64 {
        let mut state = self.0.lock().expect("dayclock mutex poisoned");
        let adjusted = (now_micros as i64).wrapping_add(state.offset) as u64 & WORD_MASK;
        let uniqueness = if adjusted == state.last_micros {
            state.uniqueness = (state.uniqueness + 1) & 0x1F;
            state.uniqueness
        } else {
            state.last_micros = adjusted;
            state.uniqueness = 0;
            0
        };
        (adjusted << 5) | u64::from(uniqueness)
    }

    /// Read the clock against the host's current wall-clock time.
    #[must_use]
    pub fn read_now(&self) -> u64 {
        let now_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        self.read_at(now_micros)
    }
}
