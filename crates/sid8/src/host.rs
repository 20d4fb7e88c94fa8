//! Simulated host computer.
//!
//! On the real board the decoder is driven by the bus interrupt. In a
//! hosted build a dedicated thread plays that role: it replays a trace of
//! register writes and reset pulses as bus cycles, paced in real time at
//! the host clock rate.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};
use sid8_core::HostClock;

use crate::bus::{BusLines, CHIP_COUNT, encode_address};
use crate::decoder::BusDecoder;
use crate::error::Sid8Error;

/// Base of the chip window in the host's memory map.
pub const SID_BASE: u16 = 0xD400;

/// Sleep while the simulated host is ahead of real time.
const PACING_SLEEP: Duration = Duration::from_micros(200);

/// One host write to the chip window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceWrite {
    pub cycle: u64,
    pub address: u16,
    pub value: u8,
}

/// Reset line held for `length` cycles from `cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPulse {
    pub cycle: u64,
    pub length: u32,
}

/// Register writes and reset pulses, ordered by cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTrace {
    pub writes: Vec<TraceWrite>,
    #[serde(default)]
    pub resets: Vec<ResetPulse>,
}

/// Accepted trace file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum TraceFile {
    Writes(Vec<TraceWrite>),
    Full(HostTrace),
}

/// C major scale from middle C, in millihertz.
const DEMO_SCALE: [u64; 8] = [261_626, 293_665, 329_628, 349_228, 391_995, 440_000, 493_883, 523_251];

impl HostTrace {
    pub fn from_json_str(json: &str) -> Result<Self, Sid8Error> {
        let file: TraceFile =
            serde_json::from_str(json).map_err(|source| Sid8Error::Parse { what: "host trace", source })?;
        let mut trace = match file {
            TraceFile::Writes(writes) => HostTrace { writes, resets: Vec::new() },
            TraceFile::Full(trace) => trace,
        };
        trace.writes.sort_by_key(|w| w.cycle);
        trace.resets.sort_by_key(|r| r.cycle);
        Ok(trace)
    }

    pub fn load(path: &Path) -> Result<Self, Sid8Error> {
        let json = std::fs::read_to_string(path).map_err(|source| Sid8Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// A few seconds of arpeggios spread over all eight chips.
    #[must_use]
    pub fn demo(clock: HostClock) -> Self {
        let mut writes = Vec::new();
        let mut cycle = 0;
        let mut put = |cycle: &mut u64, chip: u8, register: u8, value: u8| {
            writes.push(TraceWrite {
                cycle: *cycle,
                address: SID_BASE | encode_address(chip, register),
                value,
            });
            // Roughly the spacing of an STA loop.
            *cycle += 8;
        };

        for chip in 0..CHIP_COUNT as u8 {
            put(&mut cycle, chip, 0x18, 0x0F);
            put(&mut cycle, chip, 0x02, 0x00);
            put(&mut cycle, chip, 0x03, 0x08);
            put(&mut cycle, chip, 0x05, 0x09);
            put(&mut cycle, chip, 0x06, 0x00);
        }

        let beat = clock.frequency_hz / 4;
        for step in 0..16u64 {
            let mut at = step * beat + 1000;
            for chip in 0..CHIP_COUNT as u8 {
                let note = DEMO_SCALE[(step as usize + usize::from(chip) * 2) % DEMO_SCALE.len()];
                let octave = u64::from(chip / 4);
                let freq = ((note << octave) << 24) / 1000 / clock.frequency_hz.max(1);
                let wave = if chip % 2 == 0 { 0x40 } else { 0x20 };
                put(&mut at, chip, 0x00, freq as u8);
                put(&mut at, chip, 0x01, (freq >> 8) as u8);
                put(&mut at, chip, 0x04, wave);
                put(&mut at, chip, 0x04, wave | 0x01);
            }
        }

        HostTrace { writes, resets: Vec::new() }
    }

    /// Cycle of the last write or the end of the last reset pulse.
    #[must_use]
    pub fn end_cycle(&self) -> u64 {
        let writes = self.writes.last().map_or(0, |w| w.cycle + 1);
        let resets = self
            .resets
            .iter()
            .map(|r| r.cycle + u64::from(r.length))
            .max()
            .unwrap_or(0);
        writes.max(resets)
    }
}

/// Turns a trace into one set of bus lines per host cycle.
///
/// Writes are issued at their cycle, or as soon after as the bus is free
/// when several share a cycle.
pub struct TracePlayer {
    trace: HostTrace,
    next_write: usize,
    next_reset: usize,
    reset_until: u64,
    cycle: u64,
}

impl TracePlayer {
    #[must_use]
    pub fn new(trace: HostTrace) -> Self {
        Self {
            trace,
            next_write: 0,
            next_reset: 0,
            reset_until: 0,
            cycle: 0,
        }
    }

    /// Bus lines for the next host cycle.
    pub fn next_lines(&mut self) -> BusLines {
        let cycle = self.cycle;
        self.cycle += 1;

        while let Some(pulse) = self.trace.resets.get(self.next_reset) {
            if pulse.cycle > cycle {
                break;
            }
            self.reset_until = self.reset_until.max(pulse.cycle + u64::from(pulse.length));
            self.next_reset += 1;
        }

        let mut lines = match self.trace.writes.get(self.next_write) {
            Some(write) if write.cycle <= cycle => {
                self.next_write += 1;
                BusLines::write(write.address, write.value)
            }
            _ => BusLines::idle(),
        };
        lines.reset = cycle < self.reset_until;
        lines
    }

    /// Cycles played so far.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// True once every write and reset pulse has been played.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.next_write >= self.trace.writes.len()
            && self.next_reset >= self.trace.resets.len()
            && self.cycle >= self.reset_until
    }
}

/// Drives a [`BusDecoder`] from a trace on its own thread.
pub struct HostSimulator {
    player: TracePlayer,
    clock: HostClock,
    run_cycles: u64,
}

impl HostSimulator {
    /// Simulate a host at `clock` for `run_cycles` bus cycles.
    #[must_use]
    pub fn new(trace: HostTrace, clock: HostClock, run_cycles: u64) -> Self {
        Self {
            player: TracePlayer::new(trace),
            clock,
            run_cycles,
        }
    }

    /// Run `cycles` bus cycles back to back, without pacing.
    pub fn drive(&mut self, decoder: &mut BusDecoder, cycles: u64) {
        for _ in 0..cycles {
            let lines = self.player.next_lines();
            decoder.on_bus_cycle(&lines);
        }
    }

    /// Start the bus thread. It stops at the end of the run, when the
    /// decoder is disarmed, or when `stop` is set, and hands the decoder
    /// back.
    pub fn spawn(
        mut self,
        mut decoder: BusDecoder,
        stop: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<BusDecoder>> {
        thread::Builder::new().name("sid8-bus".into()).spawn(move || {
            let start = Instant::now();
            let hz = u128::from(self.clock.frequency_hz);
            let mut cycle = 0u64;

            while cycle < self.run_cycles && decoder.shared().is_armed() && !stop.load(Ordering::Relaxed) {
                let due = ((start.elapsed().as_micros() * hz / 1_000_000) as u64).min(self.run_cycles);
                if cycle >= due {
                    thread::sleep(PACING_SLEEP);
                    continue;
                }
                self.drive(&mut decoder, due - cycle);
                cycle = due;
            }

            debug!("Host simulator stopped after {cycle} cycles");
            decoder
        })
    }
}
