//! SID voice: oscillator and waveform generation.
//!
//! Each voice has a 24-bit phase accumulator advanced once per bus cycle,
//! four waveform generators that are ANDed together when more than one is
//! selected, ring modulation, hard sync, and a test bit.

#![allow(clippy::cast_possible_truncation)]

/// Noise LFSR power-on state.
const NOISE_SEED: u32 = 0x7F_FFFF;

const ACCUMULATOR_MASK: u32 = 0x00FF_FFFF;
const ACCUMULATOR_MSB: u32 = 0x0080_0000;
const NOISE_CLOCK_BIT: u32 = 1 << 19;

// Control register bits ($04/$0B/$12).
const CTRL_GATE: u8 = 0x01;
const CTRL_SYNC: u8 = 0x02;
const CTRL_RING: u8 = 0x04;
const CTRL_TEST: u8 = 0x08;
const CTRL_TRIANGLE: u8 = 0x10;
const CTRL_SAWTOOTH: u8 = 0x20;
const CTRL_PULSE: u8 = 0x40;
const CTRL_NOISE: u8 = 0x80;

/// A single SID voice oscillator.
pub struct Voice {
    /// 24-bit phase accumulator.
    pub accumulator: u32,
    /// 16-bit frequency (`freq_lo | freq_hi << 8`).
    pub frequency: u16,
    /// 12-bit pulse width.
    pub pulse_width: u16,
    /// Control register.
    pub control: u8,
    /// 23-bit noise shift register.
    noise_lfsr: u32,
    /// Bit 19 of the accumulator on the previous cycle (noise clock edge).
    prev_noise_clock: bool,
}

impl Voice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulator: 0,
            frequency: 0,
            pulse_width: 0,
            control: 0,
            noise_lfsr: NOISE_SEED,
            prev_noise_clock: false,
        }
    }

    /// Write one of the five oscillator registers (offset 0–4 within the
    /// voice's seven-register block).
    pub fn write_register(&mut self, offset: u8, value: u8) {
        let value16 = u16::from(value);
        match offset {
            0 => self.frequency = (self.frequency & 0xFF00) | value16,
            1 => self.frequency = (self.frequency & 0x00FF) | (value16 << 8),
            2 => self.pulse_width = (self.pulse_width & 0x0F00) | value16,
            3 => self.pulse_width = (self.pulse_width & 0x00FF) | ((value16 & 0x0F) << 8),
            4 => self.control = value,
            _ => {}
        }
    }

    /// Return to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn gate(&self) -> bool {
        self.control & CTRL_GATE != 0
    }

    #[must_use]
    pub fn sync_enabled(&self) -> bool {
        self.control & CTRL_SYNC != 0
    }

    /// Advance the accumulator by the frequency register.
    ///
    /// The test bit holds the accumulator at zero and reseeds the noise
    /// generator.
    pub fn clock_accumulator(&mut self) {
        if self.control & CTRL_TEST != 0 {
            self.accumulator = 0;
            self.noise_lfsr = NOISE_SEED;
            self.prev_noise_clock = false;
            return;
        }
        self.accumulator = self.accumulator.wrapping_add(u32::from(self.frequency)) & ACCUMULATOR_MASK;
    }

    /// Shift the noise LFSR on a rising edge of accumulator bit 19.
    pub fn clock_noise(&mut self) {
        let clock = self.accumulator & NOISE_CLOCK_BIT != 0;
        if clock && !self.prev_noise_clock {
            let feedback = ((self.noise_lfsr >> 22) ^ (self.noise_lfsr >> 17)) & 1;
            self.noise_lfsr = ((self.noise_lfsr << 1) | feedback) & 0x7F_FFFF;
        }
        self.prev_noise_clock = clock;
    }

    /// Hard sync: restart the accumulator when the source MSB rises.
    pub fn apply_sync(&mut self, source_prev_msb: bool, source_msb: bool) {
        if source_msb && !source_prev_msb {
            self.accumulator = 0;
        }
    }

    /// MSB of the accumulator (bit 23).
    #[must_use]
    pub fn msb(&self) -> bool {
        self.accumulator & ACCUMULATOR_MSB != 0
    }

    /// 12-bit waveform output.
    ///
    /// `ring_source_msb` is the accumulator MSB of the voice feeding this
    /// one's ring modulator.
    #[must_use]
    pub fn waveform_output(&self, ring_source_msb: bool) -> u16 {
        let selected = [
            (CTRL_TRIANGLE, self.triangle(ring_source_msb)),
            (CTRL_SAWTOOTH, self.sawtooth()),
            (CTRL_PULSE, self.pulse()),
            (CTRL_NOISE, self.noise()),
        ];

        selected
            .iter()
            .filter(|(bit, _)| self.control & bit != 0)
            .map(|&(_, wave)| wave)
            .reduce(|combined, wave| combined & wave)
            .unwrap_or(0)
    }

    fn triangle(&self, ring_source_msb: bool) -> u16 {
        let mut acc = self.accumulator;
        if self.control & CTRL_RING != 0 && ring_source_msb {
            acc ^= ACCUMULATOR_MSB;
        }
        // Fold the upper half back down to form the triangle.
        let folded = if acc & ACCUMULATOR_MSB != 0 { acc ^ 0x007F_FFFF } else { acc };
        ((folded >> 11) & 0xFFF) as u16
    }

    fn sawtooth(&self) -> u16 {
        ((self.accumulator >> 12) & 0xFFF) as u16
    }

    fn pulse(&self) -> u16 {
        if self.sawtooth() < (self.pulse_width & 0xFFF) { 0xFFF } else { 0x000 }
    }

    fn noise(&self) -> u16 {
        // LFSR taps 20, 18, 14, 11, 9, 5, 2, 0 drive output bits 11..4.
        const TAPS: [u32; 8] = [20, 18, 14, 11, 9, 5, 2, 0];
        TAPS.iter()
            .enumerate()
            .fold(0u16, |out, (i, &tap)| {
                out | ((((self.noise_lfsr >> tap) & 1) as u16) << (11 - i))
            })
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_and_pulse_registers_combine() {
        let mut voice = Voice::new();
        voice.write_register(0, 0x34);
        voice.write_register(1, 0x12);
        voice.write_register(2, 0xCD);
        voice.write_register(3, 0xFB);
        assert_eq!(voice.frequency, 0x1234);
        assert_eq!(voice.pulse_width, 0x0BCD, "pulse width is 12 bits");
    }

    #[test]
    fn test_bit_holds_accumulator() {
        let mut voice = Voice::new();
        voice.frequency = 0xFFFF;
        voice.clock_accumulator();
        assert_ne!(voice.accumulator, 0);
        voice.control = CTRL_TEST;
        voice.clock_accumulator();
        assert_eq!(voice.accumulator, 0);
    }

    #[test]
    fn combined_waveforms_are_anded() {
        let mut voice = Voice::new();
        voice.accumulator = 0x40_0000;
        voice.pulse_width = 0xFFF;
        voice.control = CTRL_SAWTOOTH | CTRL_PULSE;
        assert_eq!(voice.waveform_output(false), 0x400);
        voice.control = 0;
        assert_eq!(voice.waveform_output(false), 0);
    }

    #[test]
    fn triangle_folds_at_midpoint() {
        let mut voice = Voice::new();
        voice.control = CTRL_TRIANGLE;
        voice.accumulator = 0x7F_FFFF;
        let peak = voice.waveform_output(false);
        voice.accumulator = 0x80_0000;
        assert_eq!(voice.waveform_output(false), peak);
        assert_eq!(peak, 0xFFF);
    }

    #[test]
    fn noise_changes_after_bit19_edges() {
        let mut voice = Voice::new();
        voice.control = CTRL_NOISE;
        voice.frequency = 0xFFFF;
        let before = voice.waveform_output(false);
        for _ in 0..200 {
            voice.clock_accumulator();
            voice.clock_noise();
        }
        assert_ne!(voice.waveform_output(false), before);
    }
}
