//! Eight-SID bus emulation engine.
//!
//! Two execution contexts share an [`Arc<BusShared>`](shared::BusShared):
//! the interrupt side runs a [`BusDecoder`] once per host bus cycle and
//! feeds a lock-free transaction queue; the loop side calibrates the host
//! clock once and then runs the [`Engine`], which keeps eight chips in
//! cycle-lockstep with the host and mixes their output to stereo.

pub mod bus;
pub mod calibrate;
pub mod config;
pub mod decoder;
pub mod error;
pub mod host;
pub mod mixer;
pub mod pwm;
pub mod queue;
pub mod scheduler;
pub mod shared;
pub mod sink;

#[cfg(feature = "native")]
pub mod audio;

pub use bus::{BusEvent, BusLines, CHIP_COUNT, decode_address, encode_address};
pub use calibrate::{ClockCalibrator, CycleSource, MonotonicClock, WallClock};
pub use config::{ChipModel, ChipSettings, OutputMode, Sid8Config};
pub use decoder::{BusAction, BusDecoder};
pub use error::{CalibrationError, Sid8Error};
pub use host::{HostSimulator, HostTrace, TracePlayer};
pub use mixer::{StereoFrame, mix};
pub use queue::{QueueConsumer, QueueProducer, channel};
pub use scheduler::{Engine, EngineState, RunSummary, SampleClock, ShutdownReason, sid_bank};
pub use shared::BusShared;
pub use sink::{AudioSink, VecSink, WavSink};

#[cfg(feature = "native")]
pub use audio::CpalSink;
