//! Error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Clock calibration failures. Fatal to start-up.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("host bus not clocking: saw {seen} of {required} cycles within {waited:?}")]
    HostNotClocking {
        seen: u64,
        required: u64,
        waited: Duration,
    },
    #[error("calibration window measured zero elapsed time")]
    EmptyWindow,
    #[error("measured host clock of {0} Hz is below the sample rate")]
    TooSlow(u64),
}

#[derive(Debug, Error)]
pub enum Sid8Error {
    #[error("queue capacity {0} is not a non-zero power of two")]
    QueueCapacity(usize),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("audio output unavailable: {0}")]
    Audio(String),
    #[error("failed to write WAV capture: {0}")]
    Wav(#[from] hound::Error),
}
