//! Buffered audio device output.
//!
//! Frames go through an interleaved SPSC ring to the cpal callback. The
//! stream is built paused and only starts when the scheduler has queued
//! enough audio to ride out its own jitter.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use log::{debug, error, info};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};

use crate::error::Sid8Error;
use crate::mixer::StereoFrame;
use crate::sink::AudioSink;

/// Stereo output on the default cpal device.
pub struct CpalSink {
    stream: Stream,
    producer: HeapProd<f32>,
    dropped: u64,
}

impl CpalSink {
    /// Open the default output device with room for `buffer_frames` frames.
    pub fn new(sample_rate: u32, buffer_frames: usize) -> Result<Self, Sid8Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Sid8Error::Audio("no output device".into()))?;
        if let Ok(name) = device.name() {
            info!("Audio device: {name}");
        }

        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        let (producer, mut consumer) = HeapRb::<f32>::new(buffer_frames.max(1) * 2).split();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Silence on underrun.
                    for sample in data.iter_mut() {
                        *sample = consumer.try_pop().unwrap_or(0.0);
                    }
                },
                |err| error!("Audio stream error: {err}"),
                None,
            )
            .map_err(|err| Sid8Error::Audio(err.to_string()))?;

        // Some hosts start streams as soon as they are built.
        if let Err(err) = stream.pause() {
            debug!("Could not pause new audio stream: {err}");
        }

        Ok(Self {
            stream,
            producer,
            dropped: 0,
        })
    }

    /// Frames rejected because the device fell behind.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl AudioSink for CpalSink {
    fn put(&mut self, frame: StereoFrame) {
        if self.producer.vacant_len() < 2 {
            self.dropped += 1;
            return;
        }
        let _ = self.producer.try_push(f32::from(frame.left) / 32_768.0);
        let _ = self.producer.try_push(f32::from(frame.right) / 32_768.0);
    }

    fn queued(&self) -> usize {
        self.producer.occupied_len() / 2
    }

    fn start(&mut self) {
        if let Err(err) = self.stream.play() {
            error!("Failed to start audio stream: {err}");
        }
    }
}
