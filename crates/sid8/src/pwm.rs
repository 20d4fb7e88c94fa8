//! Direct pulse-width audio output.
//!
//! Without an audio device the board can drive two PWM channels itself.
//! The scheduler produces exactly one frame per sample period into a small
//! SPSC ring; the interrupt side, on cycles that do not touch the chips,
//! checks whether a new sample period has started and, if so, pops one
//! frame and loads the two duty registers.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use sid8_core::HostClock;

use crate::mixer::StereoFrame;
use crate::sink::AudioSink;

/// Duty register pair of the PWM peripheral.
pub trait PwmChannel {
    fn set_duty(&mut self, left: u32, right: u32);
}

/// Map a signed sample onto the lower half of the PWM range.
#[must_use]
pub fn duty(sample: i16, range: u32) -> u32 {
    let unsigned = (i32::from(sample) + 32_768) as u64;
    ((unsigned * u64::from(range)) >> 17) as u32
}

/// Loop-side half: accepts frames from the scheduler.
pub struct PwmSink {
    frames: HeapProd<StereoFrame>,
    dropped: u64,
}

impl PwmSink {
    /// Frames rejected because the ring was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl AudioSink for PwmSink {
    fn put(&mut self, frame: StereoFrame) {
        if self.frames.try_push(frame).is_err() {
            self.dropped += 1;
        }
    }

    fn queued(&self) -> usize {
        self.frames.occupied_len()
    }
}

/// Interrupt-side half: paces frames out at the sample rate.
pub struct PwmOutput {
    frames: HeapCons<StereoFrame>,
    channel: Box<dyn PwmChannel + Send>,
    range: u32,
    sample_rate: u32,
    last_sample: u64,
    underruns: u64,
}

impl PwmOutput {
    /// Called on idle bus cycles. Returns true if a new duty pair was
    /// loaded.
    pub fn on_idle_cycle(&mut self, host_cycle: u64, clock: HostClock) -> bool {
        let sample = clock.samples_elapsed(host_cycle, self.sample_rate);
        if sample == self.last_sample {
            return false;
        }
        self.last_sample = sample;

        // On underrun the previous duty stays loaded.
        let Some(frame) = self.frames.try_pop() else {
            self.underruns += 1;
            return false;
        };
        self.channel.set_duty(duty(frame.left, self.range), duty(frame.right, self.range));
        true
    }

    /// Sample periods that found no frame waiting.
    #[must_use]
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

/// Build the two halves around a ring of `buffer_frames` frames.
#[must_use]
pub fn pwm_output(
    channel: Box<dyn PwmChannel + Send>,
    range: u32,
    sample_rate: u32,
    buffer_frames: usize,
) -> (PwmSink, PwmOutput) {
    let (producer, consumer) = HeapRb::<StereoFrame>::new(buffer_frames.max(1)).split();
    (
        PwmSink {
            frames: producer,
            dropped: 0,
        },
        PwmOutput {
            frames: consumer,
            channel,
            range,
            sample_rate,
            last_sample: 0,
            underruns: 0,
        },
    )
}
