//! Bus transaction decoder.
//!
//! Runs in the interrupt context, once per host bus cycle, and must finish
//! before the next one. It never blocks, never allocates and never touches
//! a chip: reads are answered from the register cache and writes are
//! queued for the scheduler.

use std::sync::Arc;

use crate::bus::{BusEvent, BusLines, decode_address};
use crate::config::ResetConfig;
use crate::pwm::PwmOutput;
use crate::queue::QueueProducer;
use crate::shared::BusShared;

/// What the decoder did with one bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAction {
    /// Not a chip access, or a read with register reads disabled.
    Idle,
    /// Host read: this byte is driven onto the data lines.
    Drive(u8),
    /// Host write: captured into the transaction queue.
    Captured,
}

/// Interrupt-side half of the engine.
pub struct BusDecoder {
    shared: Arc<BusShared>,
    queue: QueueProducer,
    /// Local copy of the host cycle count; this is its only writer.
    cycle: u64,
    register_read: bool,
    /// Reset presses must be held longer than this to count.
    reset_debounce: u32,
    pwm: Option<PwmOutput>,
}

impl BusDecoder {
    #[must_use]
    pub fn new(shared: Arc<BusShared>, queue: QueueProducer, register_read: bool) -> Self {
        let cycle = shared.host_cycles();
        Self {
            shared,
            queue,
            cycle,
            register_read,
            reset_debounce: ResetConfig::default().debounce_cycles,
            pwm: None,
        }
    }

    /// Accept reset presses only when held longer than `cycles`.
    #[must_use]
    pub fn with_reset_debounce(mut self, cycles: u32) -> Self {
        self.reset_debounce = cycles;
        self
    }

    /// Drive a PWM output from idle cycles.
    #[must_use]
    pub fn with_pwm(mut self, pwm: PwmOutput) -> Self {
        self.pwm = Some(pwm);
        self
    }

    /// Handle one host bus cycle.
    pub fn on_bus_cycle(&mut self, lines: &BusLines) -> BusAction {
        self.shared.reset.sample(lines.reset, self.cycle, self.reset_debounce);

        let action = match (lines.chip_select, lines.read) {
            (true, false) => {
                let (chip, register) = decode_address(lines.address);
                self.queue.enqueue(BusEvent {
                    chip,
                    register,
                    value: lines.data,
                    at_cycle: self.cycle,
                });
                BusAction::Captured
            }
            (true, true) if self.register_read => {
                BusAction::Drive(self.shared.registers.get(lines.address as u8 & 0x1F))
            }
            _ => {
                if let Some(pwm) = self.pwm.as_mut() {
                    pwm.on_idle_cycle(self.cycle, self.shared.host_clock());
                }
                BusAction::Idle
            }
        };

        self.cycle += 1;
        self.shared.publish_host_cycles(self.cycle);
        action
    }

    /// Host cycles seen so far.
    #[must_use]
    pub fn host_cycles(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn shared(&self) -> &Arc<BusShared> {
        &self.shared
    }

    #[must_use]
    pub fn pwm(&self) -> Option<&PwmOutput> {
        self.pwm.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::bus::encode_address;
    use crate::mixer::StereoFrame;
    use crate::pwm::{PwmChannel, pwm_output};
    use crate::queue::{QueueConsumer, channel};
    use crate::sink::AudioSink;

    fn decoder(register_read: bool) -> (BusDecoder, QueueConsumer) {
        let (tx, rx) = channel(64).expect("queue");
        (BusDecoder::new(Arc::new(BusShared::new()), tx, register_read), rx)
    }

    #[test]
    fn idle_cycles_only_count() {
        let (mut dec, mut rx) = decoder(true);
        for _ in 0..10 {
            assert_eq!(dec.on_bus_cycle(&BusLines::idle()), BusAction::Idle);
        }
        assert_eq!(dec.shared().host_cycles(), 10);
        assert_eq!(rx.try_dequeue_due_by(u64::MAX), None);
    }

    #[test]
    fn write_is_queued_with_its_cycle() {
        let (mut dec, mut rx) = decoder(true);
        dec.on_bus_cycle(&BusLines::idle());
        dec.on_bus_cycle(&BusLines::idle());
        let action = dec.on_bus_cycle(&BusLines::write(0xD400 | encode_address(2, 5), 0x3F));
        assert_eq!(action, BusAction::Captured);
        assert_eq!(
            rx.try_dequeue_due_by(u64::MAX),
            Some(BusEvent { chip: 2, register: 5, value: 0x3F, at_cycle: 2 })
        );
        assert_eq!(dec.host_cycles(), 3);
    }

    #[test]
    fn reads_come_from_the_cache() {
        let (mut dec, _rx) = decoder(true);
        dec.shared().registers.set(0x1B, 0x42);
        // Any chip's window reads chip 0's cache.
        assert_eq!(dec.on_bus_cycle(&BusLines::read(0xD41B)), BusAction::Drive(0x42));
        assert_eq!(dec.on_bus_cycle(&BusLines::read(0xD43B)), BusAction::Drive(0x42));
        assert_eq!(dec.on_bus_cycle(&BusLines::read(0xD400)), BusAction::Drive(0));
    }

    #[test]
    fn reads_disabled_leave_the_bus_alone() {
        let (mut dec, mut rx) = decoder(false);
        dec.shared().registers.set(0x1B, 0x42);
        assert_eq!(dec.on_bus_cycle(&BusLines::read(0xD41B)), BusAction::Idle);
        assert_eq!(rx.try_dequeue_due_by(u64::MAX), None);
        assert_eq!(dec.host_cycles(), 1);
    }

    #[test]
    fn reset_line_is_sampled_every_cycle() {
        let (mut dec, _rx) = decoder(true);
        for _ in 0..4 {
            dec.on_bus_cycle(&BusLines::reset());
        }
        assert!(dec.shared().reset.pressed());
        dec.on_bus_cycle(&BusLines::idle());
        assert!(dec.shared().reset.released());
        assert_eq!(dec.shared().reset.reset_at(), 4, "released on cycle 4");
        assert_eq!(dec.host_cycles(), 5);
    }

    #[test]
    fn debounce_threshold_is_configurable() {
        let (tx, _rx) = channel(8).expect("queue");
        let mut dec = BusDecoder::new(Arc::new(BusShared::new()), tx, true).with_reset_debounce(5);
        for _ in 0..5 {
            dec.on_bus_cycle(&BusLines::reset());
        }
        dec.on_bus_cycle(&BusLines::idle());
        assert_eq!(dec.shared().reset.releases(), 1);
        assert_eq!(dec.shared().reset.reset_at(), 0, "5 cycles is not longer than 5");
    }

    #[derive(Clone, Default)]
    struct DutyCount(Arc<AtomicUsize>);

    impl PwmChannel for DutyCount {
        fn set_duty(&mut self, _left: u32, _right: u32) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn reads_disabled_still_pace_pwm() {
        let loads = DutyCount::default();
        let (mut sink, output) = pwm_output(Box::new(loads.clone()), 2048, 44_100, 16);
        for _ in 0..8 {
            sink.put(StereoFrame::default());
        }
        let (tx, _rx) = channel(8).expect("queue");
        let mut dec = BusDecoder::new(Arc::new(BusShared::new()), tx, false).with_pwm(output);

        // A host polling the chip window: every cycle is a read.
        for _ in 0..100 {
            assert_eq!(dec.on_bus_cycle(&BusLines::read(0xD41B)), BusAction::Idle);
        }
        assert_eq!(loads.0.load(Ordering::Relaxed), 4, "one duty load per PAL sample period");
    }
}
