//! Audio sinks: where mixed frames go.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::Sid8Error;
use crate::mixer::StereoFrame;

/// Destination for mixed stereo frames.
///
/// Buffered devices queue frames ahead of playback and need an explicit
/// start once enough audio is queued; direct outputs consume frames as
/// they are produced.
pub trait AudioSink {
    /// Accept one frame.
    fn put(&mut self, frame: StereoFrame);

    /// Frames queued ahead of playback.
    fn queued(&self) -> usize {
        0
    }

    /// Begin playback. Called once, after the first run of frames.
    fn start(&mut self) {}
}

/// Keeps every frame in memory. Used by tests and headless runs.
#[derive(Debug, Default)]
pub struct VecSink {
    pub frames: Vec<StereoFrame>,
    pub started: bool,
}

impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for VecSink {
    fn put(&mut self, frame: StereoFrame) {
        self.frames.push(frame);
    }

    fn start(&mut self) {
        self.started = true;
    }
}

/// Writes frames to a 16-bit stereo WAV file.
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    frames: u64,
    error: Option<hound::Error>,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, Sid8Error> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: hound::WavWriter::create(path, spec)?,
            frames: 0,
            error: None,
        })
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush the file and report the first write error, if any.
    pub fn finish(self) -> Result<u64, Sid8Error> {
        if let Some(err) = self.error {
            return Err(err.into());
        }
        self.writer.finalize()?;
        Ok(self.frames)
    }
}

impl AudioSink for WavSink {
    fn put(&mut self, frame: StereoFrame) {
        if self.error.is_some() {
            return;
        }
        let result = self
            .writer
            .write_sample(frame.left)
            .and_then(|()| self.writer.write_sample(frame.right));
        match result {
            Ok(()) => self.frames += 1,
            Err(err) => self.error = Some(err),
        }
    }
}

/// Any boxed sink is a sink, so the binary can pick one at run time.
impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn put(&mut self, frame: StereoFrame) {
        (**self).put(frame);
    }

    fn queued(&self) -> usize {
        (**self).queued()
    }

    fn start(&mut self) {
        (**self).start();
    }
}
