//! Emulation scheduler.
//!
//! The loop-context half of the engine. It owns the eight chips and the
//! consumer end of the transaction queue, and keeps the chips in lockstep
//! with the host: each call to [`Engine::service`] steps the chips until
//! `cycles_emulated` has caught up with the host cycle count published by
//! the decoder, applying at most one due bus write per step and emitting
//! audio frames at the sample rate.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use mos_sid_6581::{Sid, SidModel};
use sid8_core::{FRACTION_BITS, HostClock, Observable, ToneGenerator, Value};

use crate::bus::{BusEvent, CHIP_COUNT};
use crate::calibrate::WallClock;
use crate::config::{AudioConfig, ChipSettings, OutputMode, ShutdownConfig, Sid8Config};
use crate::error::{CalibrationError, Sid8Error};
use crate::mixer::{StereoFrame, mix};
use crate::queue::QueueConsumer;
use crate::shared::BusShared;
use crate::sink::AudioSink;

/// Read-only registers mirrored into the register output cache.
const STATUS_REGISTERS: [u8; 2] = [0x1B, 0x1C];

/// Highest register cleared by a host reset.
const LAST_RESET_REGISTER: u8 = 0x18;

const FRACTION_MASK: u64 = (1 << FRACTION_BITS) - 1;

/// Converts host cycles to audio samples in 16.16 fixed point.
///
/// The remainder of every conversion is carried into the next one, so the
/// long-run sample rate matches the host clock exactly even though chips
/// only advance in whole cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleClock {
    /// Host cycles per sample, 16.16.
    per_sample: u64,
    /// Sub-cycle remainder left by [`Self::next_period`].
    carry: u64,
    /// Cycles (16.16) counted towards the next sample by [`Self::advance`].
    pending: u64,
}

impl SampleClock {
    #[must_use]
    pub fn new(clock: HostClock, sample_rate: u32) -> Self {
        Self {
            per_sample: clock.cycles_per_sample_fixed(sample_rate).max(1),
            carry: 0,
            pending: 0,
        }
    }

    /// Host cycles per sample in 16.16 fixed point.
    #[must_use]
    pub fn cycles_per_sample(&self) -> u64 {
        self.per_sample
    }

    /// Whole cycles in the next sample period.
    pub fn next_period(&mut self) -> u32 {
        let total = self.per_sample + self.carry;
        self.carry = total & FRACTION_MASK;
        (total >> FRACTION_BITS) as u32
    }

    /// Account for `cycles` emulated cycles and return how many samples
    /// fell due.
    pub fn advance(&mut self, cycles: u32) -> u32 {
        self.pending += u64::from(cycles) << FRACTION_BITS;
        let due = self.pending / self.per_sample;
        self.pending %= self.per_sample;
        due as u32
    }

    /// Drop any accumulated fraction.
    pub fn reset(&mut self) {
        self.carry = 0;
        self.pending = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Producing audio but the output has not been started yet.
    CatchUp,
    Playing,
}

impl EngineState {
    fn name(self) -> &'static str {
        match self {
            EngineState::CatchUp => "catch-up",
            EngineState::Playing => "playing",
        }
    }
}

/// Why [`Engine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The host held reset long enough to ask the engine to leave.
    LongReset,
    /// The host bus stopped clocking.
    HostInactive,
    /// The bus interrupt was disarmed from outside the loop.
    Disarmed,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownReason::LongReset => "long host reset",
            ShutdownReason::HostInactive => "host bus inactive",
            ShutdownReason::Disarmed => "bus disarmed",
        })
    }
}

/// Totals reported when the run loop ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: ShutdownReason,
    pub host_cycles: u64,
    pub cycles_emulated: u64,
    pub events_applied: u64,
    pub frames: u64,
    pub evicted: u64,
    pub resets: u32,
}

/// Build the eight SIDs from one set of chip settings.
#[must_use]
pub fn sid_bank(settings: ChipSettings) -> [Sid; CHIP_COUNT] {
    let model = SidModel::from(settings.model);
    info!(
        "Emulating {CHIP_COUNT} x {}{}",
        model.name(),
        if settings.digi_boost { " with digi boost" } else { "" }
    );
    std::array::from_fn(|_| {
        let mut sid = Sid::new(model);
        sid.set_digi_boost(settings.digi_boost);
        sid
    })
}

/// The loop-context engine.
pub struct Engine<G: ToneGenerator, S: AudioSink> {
    chips: [G; CHIP_COUNT],
    queue: QueueConsumer,
    shared: Arc<BusShared>,
    sink: S,
    clock: HostClock,
    samples: SampleClock,
    output: OutputMode,
    step_cycles: u32,
    shutdown: ShutdownConfig,
    audio: AudioConfig,
    state: EngineState,
    cycles_emulated: u64,
    /// Frames since start-up or the last host reset.
    run_frames: u64,
    frames: u64,
    events_applied: u64,
    resets: u32,
    /// Release cycle of the last host reset applied.
    reset_applied_at: u64,
    evictions_reported: u64,
}

impl<G: ToneGenerator, S: AudioSink> Engine<G, S> {
    /// Assemble an engine around a calibrated host clock.
    ///
    /// The host clock is taken from `shared`, so calibration must have
    /// published it first. Emulation starts level with the host.
    pub fn new(
        chips: [G; CHIP_COUNT],
        queue: QueueConsumer,
        shared: Arc<BusShared>,
        sink: S,
        config: &Sid8Config,
    ) -> Result<Self, Sid8Error> {
        config.validate()?;
        let clock = shared.host_clock();
        if clock.frequency_hz < u64::from(config.sample_rate) {
            return Err(CalibrationError::TooSlow(clock.frequency_hz).into());
        }

        let cycles_emulated = shared.host_cycles();
        shared.publish_cycles_emulated(cycles_emulated);
        let reset_applied_at = shared.reset.reset_at();
        let evictions_reported = queue.evicted();

        Ok(Self {
            chips,
            queue,
            sink,
            clock,
            samples: SampleClock::new(clock, config.sample_rate),
            output: config.output,
            step_cycles: config.step_cycles,
            shutdown: config.shutdown,
            audio: config.audio,
            state: EngineState::CatchUp,
            cycles_emulated,
            run_frames: 0,
            frames: 0,
            events_applied: 0,
            resets: 0,
            reset_applied_at,
            evictions_reported,
            shared,
        })
    }

    /// One emulation step: advance every chip, refresh the register cache,
    /// apply at most one due write or host reset and emit the frames that
    /// fell due.
    ///
    /// A host reset takes effect once emulation reaches its release cycle
    /// and every write captured before that cycle has been applied. Writes
    /// from the release cycle on wait until the reset is done.
    pub fn step(&mut self) {
        let cycles = match self.output {
            OutputMode::Buffered => self.step_cycles,
            OutputMode::Pwm => self.samples.next_period(),
        };
        for chip in &mut self.chips {
            chip.clock(cycles);
        }
        self.cycles_emulated += u64::from(cycles);

        for register in STATUS_REGISTERS {
            let value = self.chips[0].read(register);
            self.shared.registers.set(register, value);
        }
        self.shared.publish_cycles_emulated(self.cycles_emulated);

        let event = if let Some(at) = self.reset_due() {
            let earlier = at.checked_sub(1).and_then(|last| self.queue.try_dequeue_due_by(last));
            if earlier.is_none() {
                self.apply_reset(at);
            }
            earlier
        } else {
            self.queue.try_dequeue_due_by(self.cycles_emulated)
        };
        if let Some(event) = event {
            self.apply(event);
        }

        let due = match self.output {
            OutputMode::Buffered => self.samples.advance(cycles),
            OutputMode::Pwm => 1,
        };
        if due > 0 {
            let frame = self.mix();
            for _ in 0..due {
                self.sink.put(frame);
            }
            self.frames += u64::from(due);
            self.run_frames += u64::from(due);
        }

        self.pace();
    }

    /// Catch up with the host, then report any queue overflow. Returns the
    /// number of steps taken.
    pub fn service(&mut self) -> u64 {
        let target = self.shared.host_cycles();
        let mut steps = 0;
        while self.cycles_emulated < target {
            self.step();
            steps += 1;
        }

        let evicted = self.queue.evicted();
        if evicted > self.evictions_reported {
            warn!(
                "Transaction queue overflow: {} writes lost ({evicted} total)",
                evicted - self.evictions_reported
            );
            self.evictions_reported = evicted;
        }

        steps
    }

    /// Shutdown condition given the time since the host last clocked.
    #[must_use]
    pub fn shutdown_reason(&self, host_idle: Duration) -> Option<ShutdownReason> {
        if !self.shared.is_armed() {
            return Some(ShutdownReason::Disarmed);
        }
        let reset = &self.shared.reset;
        if self.shared.host_cycles() > self.shutdown.min_host_cycles
            && reset.pressed()
            && reset.counter() > self.shutdown.long_reset_cycles
        {
            return Some(ShutdownReason::LongReset);
        }
        if self.shutdown.inactivity_ms > 0
            && host_idle >= Duration::from_millis(self.shutdown.inactivity_ms)
        {
            return Some(ShutdownReason::HostInactive);
        }
        None
    }

    /// Service the bus until a shutdown condition, then disarm the decoder.
    pub fn run<C: WallClock + ?Sized>(&mut self, clock: &C) -> RunSummary {
        info!(
            "Scheduler running: host {} Hz, {} cycles/sample (16.16)",
            self.clock.frequency_hz,
            self.samples.cycles_per_sample()
        );
        let mut last_host = self.shared.host_cycles();
        let mut last_seen = clock.now_micros();

        let reason = loop {
            if self.service() == 0 {
                std::thread::yield_now();
            }

            let host = self.shared.host_cycles();
            let now = clock.now_micros();
            if host != last_host {
                last_host = host;
                last_seen = now;
            }
            if let Some(reason) = self.shutdown_reason(Duration::from_micros(now - last_seen)) {
                break reason;
            }
        };

        self.shared.disarm();
        let summary = self.summary(reason);
        info!(
            "Stopped ({reason}): {} cycles, {} writes, {} frames, {} lost, {} resets",
            summary.cycles_emulated, summary.events_applied, summary.frames, summary.evicted, summary.resets
        );
        summary
    }

    /// Release the chips and hand back the sink.
    pub fn shutdown(self) -> S {
        self.shared.disarm();
        self.sink
    }

    #[must_use]
    pub fn summary(&self, reason: ShutdownReason) -> RunSummary {
        RunSummary {
            reason,
            host_cycles: self.shared.host_cycles(),
            cycles_emulated: self.cycles_emulated,
            events_applied: self.events_applied,
            frames: self.frames,
            evicted: self.queue.evicted(),
            resets: self.resets,
        }
    }

    #[must_use]
    pub fn chips(&self) -> &[G; CHIP_COUNT] {
        &self.chips
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub fn cycles_emulated(&self) -> u64 {
        self.cycles_emulated
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    #[must_use]
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Release cycle of an accepted host reset that emulation has reached
    /// but not yet applied.
    fn reset_due(&self) -> Option<u64> {
        let at = self.shared.reset.reset_at();
        (at > self.reset_applied_at && at <= self.cycles_emulated).then_some(at)
    }

    fn apply_reset(&mut self, at: u64) {
        for chip in &mut self.chips {
            for register in 0..=LAST_RESET_REGISTER {
                chip.write(register, 0);
            }
        }
        self.shared.registers.clear();
        self.samples.reset();
        self.run_frames = 0;
        self.resets += 1;
        self.reset_applied_at = at;
        info!(
            "Host reset at cycle {at} after {} cycles: all chips cleared",
            self.shared.reset.reset_length()
        );
    }

    fn apply(&mut self, event: BusEvent) {
        if let Some(chip) = self.chips.get_mut(usize::from(event.chip)) {
            chip.write(event.register, event.value);
            self.events_applied += 1;
        }
    }

    fn mix(&self) -> StereoFrame {
        let outputs: [i32; CHIP_COUNT] = std::array::from_fn(|n| self.chips[n].output());
        mix(&outputs)
    }

    /// Start a buffered output once enough audio exists, and give up the
    /// CPU while the output is comfortably ahead.
    fn pace(&mut self) {
        if self.state == EngineState::CatchUp && self.run_frames >= u64::from(self.audio.start_frames) {
            self.sink.start();
            self.state = EngineState::Playing;
            info!("Playback started after {} frames", self.run_frames);
        }
        if self.sink.queued() >= self.audio.yield_frames as usize {
            std::thread::yield_now();
        }
    }
}

const QUERY_PATHS: &[&str] = &[
    "state",
    "cycles.emulated",
    "cycles.host",
    "cycles.behind",
    "clock.frequency",
    "clock.cycles_per_sample",
    "queue.pending",
    "queue.evicted",
    "events.applied",
    "frames",
    "resets",
    "reset.pressed",
    "reset.counter",
];

impl<G, S> Observable for Engine<G, S>
where
    G: ToneGenerator + Observable,
    S: AudioSink,
{
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("chip") {
            let (index, field) = rest.split_once('.')?;
            let chip = self.chips.get(index.parse::<usize>().ok()?)?;
            return chip.query(field);
        }

        let host = self.shared.host_cycles();
        match path {
            "state" => Some(self.state.name().into()),
            "cycles.emulated" => Some(self.cycles_emulated.into()),
            "cycles.host" => Some(host.into()),
            "cycles.behind" => Some(host.saturating_sub(self.cycles_emulated).into()),
            "clock.frequency" => Some(self.clock.frequency_hz.into()),
            "clock.cycles_per_sample" => Some(self.samples.cycles_per_sample().into()),
            "queue.pending" => Some((self.queue.len() as u64).into()),
            "queue.evicted" => Some(self.queue.evicted().into()),
            "events.applied" => Some(self.events_applied.into()),
            "frames" => Some(self.frames.into()),
            "resets" => Some(self.resets.into()),
            "reset.pressed" => Some(self.shared.reset.pressed().into()),
            "reset.counter" => Some(self.shared.reset.counter().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::queue::{QueueProducer, channel};
    use crate::sink::VecSink;

    /// Chip double that latches writes and counts cycles.
    #[derive(Default)]
    struct Latch {
        registers: [u8; 32],
        cycles: u64,
    }

    impl ToneGenerator for Latch {
        fn write(&mut self, register: u8, value: u8) {
            self.registers[usize::from(register & 0x1F)] = value;
        }

        fn read(&mut self, register: u8) -> u8 {
            self.registers[usize::from(register & 0x1F)]
        }

        fn tick(&mut self) {
            self.cycles += 1;
        }

        fn output(&self) -> i32 {
            i32::from(self.registers[0]) * 100
        }
    }

    impl Observable for Latch {
        fn query(&self, path: &str) -> Option<Value> {
            match path {
                "cycles" => Some(self.cycles.into()),
                _ => None,
            }
        }

        fn query_paths(&self) -> &'static [&'static str] {
            &["cycles"]
        }
    }

    struct SteppingClock {
        micros: Cell<u64>,
        step: u64,
    }

    impl WallClock for SteppingClock {
        fn now_micros(&self) -> u64 {
            let now = self.micros.get() + self.step;
            self.micros.set(now);
            now
        }

        fn pause(&self, duration: Duration) {
            self.micros.set(self.micros.get() + duration.as_micros() as u64);
        }
    }

    fn engine_with(config: &Sid8Config) -> (Engine<Latch, VecSink>, QueueProducer, Arc<BusShared>) {
        let (tx, rx) = channel(64).expect("queue");
        let shared = Arc::new(BusShared::new());
        let chips = std::array::from_fn(|_| Latch::default());
        let engine = Engine::new(chips, rx, Arc::clone(&shared), VecSink::new(), config).expect("engine");
        (engine, tx, shared)
    }

    fn engine() -> (Engine<Latch, VecSink>, QueueProducer, Arc<BusShared>) {
        engine_with(&Sid8Config::default())
    }

    fn write(chip: u8, register: u8, value: u8, at_cycle: u64) -> BusEvent {
        BusEvent { chip, register, value, at_cycle }
    }

    #[test]
    fn sample_periods_add_up_to_the_host_clock() {
        let mut clock = SampleClock::new(HostClock::PAL, 44_100);
        let total: u64 = (0..44_100).map(|_| u64::from(clock.next_period())).sum();
        assert!(total.abs_diff(985_248) <= 1, "one second of periods covered {total} cycles");
    }

    #[test]
    fn small_steps_produce_the_sample_rate() {
        let mut clock = SampleClock::new(HostClock::PAL, 44_100);
        let frames: u64 = (0..985_248 / 2).map(|_| u64::from(clock.advance(2))).sum();
        assert!(frames.abs_diff(44_100) <= 1, "one second produced {frames} frames");
    }

    #[test]
    fn large_step_emits_several_samples() {
        let mut clock = SampleClock::new(HostClock::PAL, 44_100);
        assert_eq!(clock.advance(100), 4);
        clock.reset();
        assert_eq!(clock.advance(22), 0);
    }

    #[test]
    fn rejects_host_slower_than_sample_rate() {
        let (_tx, rx) = channel(8).expect("queue");
        let shared = Arc::new(BusShared::new());
        shared.set_host_clock(HostClock::new(20_000));
        let chips = std::array::from_fn(|_| Latch::default());
        let result = Engine::new(chips, rx, shared, VecSink::new(), &Sid8Config::default());
        assert!(matches!(
            result,
            Err(Sid8Error::Calibration(CalibrationError::TooSlow(20_000)))
        ));
    }

    #[test]
    fn catches_up_to_the_host() {
        let (mut engine, _tx, shared) = engine();
        shared.publish_host_cycles(1000);
        assert_eq!(engine.service(), 500);
        assert_eq!(engine.cycles_emulated(), 1000);
        assert_eq!(shared.cycles_emulated(), 1000);
        assert!(engine.chips().iter().all(|chip| chip.cycles == 1000));
        assert_eq!(engine.service(), 0, "nothing to do once level");
    }

    #[test]
    fn writes_wait_for_their_cycle() {
        let (mut engine, mut tx, shared) = engine();
        tx.enqueue(write(3, 4, 0x55, 100));
        shared.publish_host_cycles(50);
        engine.service();
        assert_eq!(engine.chips()[3].registers[4], 0);

        shared.publish_host_cycles(120);
        engine.service();
        assert_eq!(engine.chips()[3].registers[4], 0x55);
        assert_eq!(engine.events_applied(), 1);
    }

    #[test]
    fn one_write_per_step() {
        let (mut engine, mut tx, _shared) = engine();
        for value in 1..=3 {
            tx.enqueue(write(0, 1, value, 0));
        }
        engine.step();
        assert_eq!(engine.chips()[0].registers[1], 1);
        engine.step();
        assert_eq!(engine.chips()[0].registers[1], 2);
        engine.step();
        assert_eq!(engine.chips()[0].registers[1], 3);
    }

    #[test]
    fn status_registers_are_mirrored_from_chip_zero() {
        let (mut engine, mut tx, shared) = engine();
        tx.enqueue(write(0, 0x1B, 0x99, 0));
        tx.enqueue(write(1, 0x1C, 0x77, 0));
        engine.step();
        engine.step();
        engine.step();
        assert_eq!(shared.registers.get(0x1B), 0x99);
        assert_eq!(shared.registers.get(0x1C), 0, "only chip 0 feeds the cache");
    }

    #[test]
    fn frames_follow_the_sample_rate_and_start_playback() {
        let (mut engine, mut tx, shared) = engine();
        tx.enqueue(write(1, 0, 2, 0));
        shared.publish_host_cycles(985_248 / 10);
        engine.service();
        assert!(engine.frames().abs_diff(4410) <= 1, "got {} frames", engine.frames());
        assert_eq!(engine.state(), EngineState::Playing);
        assert!(engine.sink().started);
        // Chip 1 is a left-channel chip: 200 >> 1.
        assert_eq!(engine.sink().frames.last(), Some(&StereoFrame::new(100, 0)));
    }

    #[test]
    fn pwm_mode_emits_one_frame_per_step() {
        let config = Sid8Config { output: OutputMode::Pwm, ..Sid8Config::default() };
        let (mut engine, _tx, _shared) = engine_with(&config);
        for _ in 0..10 {
            engine.step();
        }
        assert_eq!(engine.frames(), 10);
        // 22.34 cycles per PAL sample.
        assert!((220..=224).contains(&engine.cycles_emulated()));
    }

    /// Hold the reset line from `from` for `cycles` host cycles, releasing
    /// on the cycle after.
    fn press_reset(shared: &BusShared, from: u64, cycles: u64) {
        for cycle in from..from + cycles {
            shared.reset.sample(true, cycle, 3);
        }
        shared.reset.sample(false, from + cycles, 3);
    }

    #[test]
    fn debounced_reset_clears_every_chip() {
        let (mut engine, mut tx, shared) = engine();
        for chip in 0..8 {
            tx.enqueue(write(chip, 0x18, 0x0F, 0));
        }
        shared.publish_host_cycles(100);
        engine.service();
        assert!(engine.chips().iter().all(|chip| chip.registers[0x18] == 0x0F));

        press_reset(&shared, 100, 5);
        shared.publish_host_cycles(110);
        engine.service();
        assert!(engine.chips().iter().all(|chip| chip.registers[..=0x18].iter().all(|&r| r == 0)));
        assert_eq!(engine.resets(), 1);

        shared.publish_host_cycles(200);
        engine.service();
        assert_eq!(engine.resets(), 1, "a reset is applied once");
    }

    #[test]
    fn short_reset_pulse_is_ignored() {
        let (mut engine, mut tx, shared) = engine();
        tx.enqueue(write(0, 2, 0x40, 0));
        press_reset(&shared, 0, 3);
        shared.publish_host_cycles(10);
        engine.service();
        assert_eq!(engine.chips()[0].registers[2], 0x40);
        assert_eq!(engine.resets(), 0);
    }

    #[test]
    fn reset_lands_between_earlier_and_later_writes() {
        let (mut engine, mut tx, shared) = engine();
        tx.enqueue(write(4, 1, 0x11, 2));
        press_reset(&shared, 4, 10);
        tx.enqueue(write(4, 1, 0x22, 14));
        tx.enqueue(write(4, 2, 0x33, 15));
        shared.publish_host_cycles(40);
        engine.service();

        assert_eq!(engine.resets(), 1);
        assert_eq!(engine.chips()[4].registers[1], 0x22);
        assert_eq!(engine.chips()[4].registers[2], 0x33);
        assert_eq!(engine.events_applied(), 3);
    }

    #[test]
    fn backlog_before_a_reset_drains_first() {
        let (mut engine, mut tx, shared) = engine();
        // More writes at cycle 0 than steps before the release: the
        // reset still waits for all of them.
        for value in 1..=8 {
            tx.enqueue(write(0, 3, value, 0));
        }
        press_reset(&shared, 0, 4);
        tx.enqueue(write(0, 4, 0x44, 4));
        shared.publish_host_cycles(40);
        engine.service();

        assert_eq!(engine.resets(), 1);
        assert_eq!(engine.chips()[0].registers[3], 0, "earlier writes are cleared by the reset");
        assert_eq!(engine.chips()[0].registers[4], 0x44);
        assert_eq!(engine.events_applied(), 9);
    }

    #[test]
    fn long_reset_shuts_down() {
        let mut config = Sid8Config::default();
        config.shutdown.min_host_cycles = 100;
        config.shutdown.long_reset_cycles = 50;
        let (mut engine, _tx, shared) = engine_with(&config);
        shared.publish_host_cycles(200);
        for cycle in 140..200 {
            shared.reset.sample(true, cycle, 3);
        }

        let clock = SteppingClock { micros: Cell::new(0), step: 10 };
        let summary = engine.run(&clock);
        assert_eq!(summary.reason, ShutdownReason::LongReset);
        assert_eq!(summary.cycles_emulated, 200);
        assert!(!shared.is_armed());
    }

    #[test]
    fn silent_host_shuts_down() {
        let (mut engine, _tx, shared) = engine();
        shared.publish_host_cycles(10);
        let clock = SteppingClock { micros: Cell::new(0), step: 1000 };
        let summary = engine.run(&clock);
        assert_eq!(summary.reason, ShutdownReason::HostInactive);
        assert!(clock.micros.get() >= 2_000_000);
        assert!(!shared.is_armed());
    }

    #[test]
    fn disarm_stops_the_loop() {
        let (mut engine, _tx, shared) = engine();
        shared.disarm();
        let clock = SteppingClock { micros: Cell::new(0), step: 1 };
        assert_eq!(engine.run(&clock).reason, ShutdownReason::Disarmed);
    }

    #[test]
    fn reports_state_by_path() {
        let (mut engine, mut tx, shared) = engine();
        tx.enqueue(write(0, 0, 1, 0));
        shared.publish_host_cycles(10);
        engine.service();
        assert_eq!(engine.query("cycles.emulated"), Some(Value::U64(10)));
        assert_eq!(engine.query("chip7.cycles"), Some(Value::U64(10)));
        assert_eq!(engine.query("chip8.cycles"), None);
        assert_eq!(engine.query("events.applied").and_then(|v| v.as_u64()), Some(1));
        assert_eq!(engine.query("state"), Some(Value::from("catch-up")));
        assert_eq!(engine.query("nonsense"), None);
    }
}
