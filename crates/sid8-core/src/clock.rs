//! Host bus clock.

/// Fractional bits used for cycles-per-sample arithmetic.
pub const FRACTION_BITS: u32 = 16;

/// The host computer's bus clock.
///
/// The nominal rate (985,248 Hz for a PAL C64) is only a starting point:
/// real machines drift by a few hundred hertz, so the engine measures the
/// rate at start-up and keeps it fixed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostClock {
    /// Bus cycles per second.
    pub frequency_hz: u64,
}

impl HostClock {
    /// Nominal PAL C64 clock.
    pub const PAL: Self = Self::new(985_248);
    /// Nominal NTSC C64 clock.
    pub const NTSC: Self = Self::new(1_022_727);

    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Host cycles per output sample in 16.16 fixed point.
    ///
    /// Returns 0 for a zero sample rate.
    #[must_use]
    pub const fn cycles_per_sample_fixed(&self, sample_rate: u32) -> u64 {
        if sample_rate == 0 {
            return 0;
        }
        (self.frequency_hz << FRACTION_BITS) / sample_rate as u64
    }

    /// Number of whole samples elapsed after `cycles` host cycles.
    #[must_use]
    pub const fn samples_elapsed(&self, cycles: u64, sample_rate: u32) -> u64 {
        if self.frequency_hz == 0 {
            return 0;
        }
        (cycles as u128 * sample_rate as u128 / self.frequency_hz as u128) as u64
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::PAL
    }
}
