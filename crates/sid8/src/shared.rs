//! State shared between the interrupt context and the scheduler loop.
//!
//! Every field has exactly one writer. The decoder (interrupt context)
//! owns the host cycle count and the reset lines; the scheduler (loop
//! context) owns the emulated cycle count, the register output cache, the
//! host clock and the armed flag. Readers on the other side only load.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use sid8_core::HostClock;

use crate::bus::REGISTER_COUNT;

/// Register values served to host reads without touching the chips.
///
/// Refreshed from chip 0 once per scheduler step, so a host read sees the
/// state from at most one step ago.
pub struct RegisterCache {
    values: [AtomicU8; REGISTER_COUNT],
}

impl RegisterCache {
    fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU8::new(0)),
        }
    }

    #[must_use]
    pub fn get(&self, register: u8) -> u8 {
        self.values[usize::from(register) % REGISTER_COUNT].load(Ordering::Relaxed)
    }

    pub fn set(&self, register: u8, value: u8) {
        self.values[usize::from(register) % REGISTER_COUNT].store(value, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for value in &self.values {
            value.store(0, Ordering::Relaxed);
        }
    }
}

/// Host reset line state, debounced by the decoder.
///
/// Every completed press is counted, but only a press held longer than the
/// debounce threshold is accepted as a reset. The decoder publishes the host
/// cycle at which the latest accepted press was released; the scheduler
/// applies each accepted reset at that point in the write stream. A later
/// glitch never replaces an accepted press.
pub struct ResetState {
    /// Cycles the line has been held in the current (or last) press.
    counter: AtomicU32,
    pressed: AtomicBool,
    released: AtomicBool,
    /// Completed presses since start-up, accepted or not.
    releases: AtomicU32,
    /// Length of the latest accepted press, stored before `reset_at`.
    reset_length: AtomicU32,
    /// Host cycle of the latest accepted release (0: none yet).
    reset_at: AtomicU64,
}

impl ResetState {
    fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            pressed: AtomicBool::new(false),
            released: AtomicBool::new(false),
            releases: AtomicU32::new(0),
            reset_length: AtomicU32::new(0),
            reset_at: AtomicU64::new(0),
        }
    }

    /// Sample the reset line on host cycle `cycle`. Decoder only.
    pub(crate) fn sample(&self, asserted: bool, cycle: u64, debounce: u32) {
        let pressed = self.pressed.load(Ordering::Relaxed);
        if asserted {
            let held = if pressed { self.counter.load(Ordering::Relaxed) } else { 0 };
            self.counter.store(held.saturating_add(1), Ordering::Relaxed);
            if !pressed {
                self.released.store(false, Ordering::Relaxed);
                self.pressed.store(true, Ordering::Release);
            }
        } else if pressed {
            let held = self.counter.load(Ordering::Relaxed);
            if held > debounce {
                self.reset_length.store(held, Ordering::Relaxed);
                self.reset_at.store(cycle, Ordering::Release);
            }
            self.pressed.store(false, Ordering::Relaxed);
            self.released.store(true, Ordering::Relaxed);
            self.releases.fetch_add(1, Ordering::Release);
        }
    }

    /// Cycles held in the current or most recent press.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pressed(&self) -> bool {
        self.pressed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }

    /// Completed presses so far, including ones too short to count.
    #[must_use]
    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::Acquire)
    }

    /// Host cycle at which the latest accepted press was released, or 0.
    ///
    /// Writes captured on or after this cycle were made after the reset.
    #[must_use]
    pub fn reset_at(&self) -> u64 {
        self.reset_at.load(Ordering::Acquire)
    }

    /// Length of the latest accepted press. Read after [`Self::reset_at`].
    #[must_use]
    pub fn reset_length(&self) -> u32 {
        self.reset_length.load(Ordering::Relaxed)
    }
}

/// Cross-context state for one engine.
pub struct BusShared {
    host_cycles: AtomicU64,
    cycles_emulated: AtomicU64,
    host_clock_hz: AtomicU64,
    armed: AtomicBool,
    pub reset: ResetState,
    pub registers: RegisterCache,
}

impl BusShared {
    #[must_use]
    pub fn new() -> Self {
        Self {
            host_cycles: AtomicU64::new(0),
            cycles_emulated: AtomicU64::new(0),
            host_clock_hz: AtomicU64::new(HostClock::PAL.frequency_hz),
            armed: AtomicBool::new(true),
            reset: ResetState::new(),
            registers: RegisterCache::new(),
        }
    }

    /// Host bus cycles observed by the decoder.
    #[must_use]
    pub fn host_cycles(&self) -> u64 {
        self.host_cycles.load(Ordering::Acquire)
    }

    pub(crate) fn publish_host_cycles(&self, cycles: u64) {
        self.host_cycles.store(cycles, Ordering::Release);
    }

    #[must_use]
    pub fn cycles_emulated(&self) -> u64 {
        self.cycles_emulated.load(Ordering::Acquire)
    }

    pub(crate) fn publish_cycles_emulated(&self, cycles: u64) {
        self.cycles_emulated.store(cycles, Ordering::Release);
    }

    /// Host clock used for sample pacing on the interrupt side.
    #[must_use]
    pub fn host_clock(&self) -> HostClock {
        HostClock::new(self.host_clock_hz.load(Ordering::Relaxed))
    }

    pub fn set_host_clock(&self, clock: HostClock) {
        self.host_clock_hz.store(clock.frequency_hz, Ordering::Relaxed);
    }

    /// Whether the bus interrupt should keep invoking the decoder.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Stop servicing the bus. Called once on shutdown.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }
}

impl Default for BusShared {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_press_and_release() {
        let reset = ResetState::new();
        for cycle in 0..5 {
            reset.sample(true, cycle, 3);
        }
        assert!(reset.pressed());
        assert!(!reset.released());
        assert_eq!(reset.counter(), 5);
        assert_eq!(reset.reset_at(), 0, "nothing accepted while held");

        reset.sample(false, 5, 3);
        assert!(!reset.pressed());
        assert!(reset.released());
        assert_eq!(reset.releases(), 1);
        assert_eq!(reset.reset_at(), 5);
        assert_eq!(reset.reset_length(), 5);

        reset.sample(false, 6, 3);
        assert_eq!(reset.releases(), 1, "release is an edge, not a level");
    }

    #[test]
    fn new_press_restarts_counter() {
        let reset = ResetState::new();
        reset.sample(true, 0, 3);
        reset.sample(true, 1, 3);
        reset.sample(false, 2, 3);
        reset.sample(true, 3, 3);
        assert_eq!(reset.counter(), 1);
        assert!(!reset.released());
        assert_eq!(reset.reset_at(), 0, "a 2-cycle press is a glitch");
    }

    #[test]
    fn glitch_after_a_reset_keeps_the_reset() {
        let reset = ResetState::new();
        for cycle in 0..10 {
            reset.sample(true, cycle, 3);
        }
        reset.sample(false, 10, 3);
        reset.sample(false, 11, 3);
        reset.sample(true, 12, 3);
        reset.sample(false, 13, 3);

        assert_eq!(reset.releases(), 2);
        assert_eq!(reset.reset_at(), 10);
        assert_eq!(reset.reset_length(), 10);
    }

    #[test]
    fn register_cache_wraps_register_index() {
        let shared = BusShared::new();
        shared.registers.set(27, 0x80);
        assert_eq!(shared.registers.get(27), 0x80);
        assert_eq!(shared.registers.get(27 + 32), 0x80);
        shared.registers.clear();
        assert_eq!(shared.registers.get(27), 0);
    }

    #[test]
    fn disarm_is_sticky() {
        let shared = BusShared::new();
        assert!(shared.is_armed());
        shared.disarm();
        assert!(!shared.is_armed());
    }
}
