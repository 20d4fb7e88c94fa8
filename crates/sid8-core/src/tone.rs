//! Trait for cycle-stepped sound chips.

/// A sound chip that is clocked by the host bus.
///
/// The engine owns one instance per emulated chip. Register writes arrive
/// from the host in bus-cycle order; the engine interleaves them with
/// `clock` calls so that each write lands at the right emulated time.
pub trait ToneGenerator {
    /// Write a chip register (0x00–0x1F). Writes to read-only registers
    /// are ignored by the chip.
    fn write(&mut self, register: u8, value: u8);

    /// Read a chip register (0x00–0x1F).
    ///
    /// Takes `&mut self` because some chips latch state on read.
    fn read(&mut self, register: u8) -> u8;

    /// Advance the chip by one host bus cycle.
    fn tick(&mut self);

    /// Advance the chip by `cycles` host bus cycles.
    ///
    /// Default implementation calls `tick()` in a loop. Chips may override
    /// for efficiency, but must produce identical results.
    fn clock(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    /// Current output sample, signed, within the 16-bit range.
    fn output(&self) -> i32;
}
