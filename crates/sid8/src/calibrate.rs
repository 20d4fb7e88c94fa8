//! Host clock calibration.
//!
//! The host's bus clock is only nominally 985,248 Hz. Before playback the
//! loop context waits for the bus to come alive, then counts host cycles
//! over a fixed wall-clock window. The result stays fixed for the rest of
//! the run.

use std::time::{Duration, Instant};

use log::{debug, info};
use sid8_core::HostClock;

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use crate::shared::BusShared;

/// Monotonic wall-clock reference.
pub trait WallClock {
    /// Microseconds since an arbitrary fixed origin.
    fn now_micros(&self) -> u64;

    /// Sleep for roughly `duration`, giving up the CPU.
    fn pause(&self, duration: Duration);
}

/// `WallClock` backed by [`Instant`].
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Anything that reports elapsed host bus cycles.
pub trait CycleSource {
    fn host_cycles(&self) -> u64;
}

impl CycleSource for BusShared {
    fn host_cycles(&self) -> u64 {
        BusShared::host_cycles(self)
    }
}

/// Measures the host clock once at start-up.
pub struct ClockCalibrator {
    config: CalibrationConfig,
}

impl ClockCalibrator {
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    /// Wait for the host to clock at least `min_cycles` cycles.
    pub fn wait_for_host<S, C>(&self, source: &S, clock: &C) -> Result<(), CalibrationError>
    where
        S: CycleSource + ?Sized,
        C: WallClock + ?Sized,
    {
        let start_cycles = source.host_cycles();
        let start = clock.now_micros();
        let timeout = Duration::from_millis(self.config.liveness_timeout_ms);
        let poll = Duration::from_millis(self.config.poll_ms.max(1));

        loop {
            let seen = source.host_cycles() - start_cycles;
            if seen >= self.config.min_cycles {
                debug!("host bus alive after {seen} cycles");
                return Ok(());
            }
            let waited = Duration::from_micros(clock.now_micros() - start);
            if waited >= timeout {
                return Err(CalibrationError::HostNotClocking {
                    seen,
                    required: self.config.min_cycles,
                    waited,
                });
            }
            clock.pause(poll);
        }
    }

    /// Count host cycles over the calibration window.
    ///
    /// Busy-waits for the window rather than sleeping so that the end
    /// timestamp is taken as close to the window boundary as possible.
    pub fn measure<S, C>(&self, source: &S, clock: &C) -> Result<HostClock, CalibrationError>
    where
        S: CycleSource + ?Sized,
        C: WallClock + ?Sized,
    {
        let window = self.config.window_ms * 1000;
        let start = clock.now_micros();
        let start_cycles = source.host_cycles();

        let mut now = start;
        while now - start < window {
            std::hint::spin_loop();
            now = clock.now_micros();
        }
        let cycles = source.host_cycles() - start_cycles;

        let elapsed = now - start;
        if elapsed == 0 {
            return Err(CalibrationError::EmptyWindow);
        }
        Ok(HostClock::new(
            (u128::from(cycles) * 1_000_000 / u128::from(elapsed)) as u64,
        ))
    }

    /// Liveness wait followed by measurement.
    pub fn calibrate<S, C>(&self, source: &S, clock: &C) -> Result<HostClock, CalibrationError>
    where
        S: CycleSource + ?Sized,
        C: WallClock + ?Sized,
    {
        self.wait_for_host(source, clock)?;
        let host = self.measure(source, clock)?;
        info!("Measured host clock frequency: {} Hz", host.frequency_hz);
        Ok(host)
    }
}
