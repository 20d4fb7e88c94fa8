//! Engine configuration.
//!
//! Loaded from JSON. Every field has a default, so `{}` is a complete
//! configuration.

use std::path::Path;

use mos_sid_6581::SidModel;
use serde::{Deserialize, Serialize};

use crate::bus::CHIP_COUNT;
use crate::error::Sid8Error;
use crate::queue::DEFAULT_CAPACITY;

/// How mixed audio leaves the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Buffered audio device, started once enough frames are queued.
    #[default]
    Buffered,
    /// Two PWM channels loaded from the bus interrupt.
    Pwm,
}

/// Chip revision as spelled in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChipModel {
    #[serde(rename = "6581")]
    Mos6581,
    #[default]
    #[serde(rename = "8580")]
    Mos8580,
}

impl From<ChipModel> for SidModel {
    fn from(model: ChipModel) -> Self {
        match model {
            ChipModel::Mos6581 => SidModel::Mos6581,
            ChipModel::Mos8580 => SidModel::Mos8580,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipSettings {
    pub model: ChipModel,
    /// Feed the external input so volume writes are audible (8580 only).
    pub digi_boost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Host cycles that prove the bus is alive.
    pub min_cycles: u64,
    /// Sleep between liveness polls.
    pub poll_ms: u64,
    /// Give up if the host has not clocked within this time.
    pub liveness_timeout_ms: u64,
    /// Measurement window.
    pub window_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_cycles: 10,
            poll_ms: 100,
            liveness_timeout_ms: 5000,
            window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    /// A press must be held longer than this many cycles to count.
    pub debounce_cycles: u32,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self { debounce_cycles: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Long-reset shutdown only applies once the host has run this long.
    pub min_host_cycles: u64,
    /// Reset held this long asks the engine to stop.
    pub long_reset_cycles: u32,
    /// Stop when the host bus has been silent this long (0 disables).
    pub inactivity_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            min_host_cycles: 2_000_000,
            long_reset_cycles: 500_000,
            inactivity_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Frames produced before a buffered device is started.
    pub start_frames: u32,
    /// Yield the loop while at least this many frames are queued.
    pub yield_frames: u32,
    /// Ring size between scheduler and PWM interrupt.
    pub pwm_buffer_frames: u32,
    /// PWM counter range.
    pub pwm_range: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            start_frames: 2205 / 8,
            yield_frames: 4410,
            pwm_buffer_frames: 2048,
            pwm_range: 2048,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sid8Config {
    pub sample_rate: u32,
    /// Answer host reads from the register cache. Turn off when a real
    /// SID is still fitted, or the two will fight over the data bus.
    pub register_read: bool,
    pub output: OutputMode,
    /// Emulation cycles per scheduler step in buffered mode.
    pub step_cycles: u32,
    /// Transaction queue slots (power of two).
    pub queue_capacity: usize,
    pub chips: [ChipSettings; CHIP_COUNT],
    pub calibration: CalibrationConfig,
    pub reset: ResetConfig,
    pub shutdown: ShutdownConfig,
    pub audio: AudioConfig,
}

impl Default for Sid8Config {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            register_read: true,
            output: OutputMode::Buffered,
            step_cycles: 2,
            queue_capacity: DEFAULT_CAPACITY,
            chips: [ChipSettings::default(); CHIP_COUNT],
            calibration: CalibrationConfig::default(),
            reset: ResetConfig::default(),
            shutdown: ShutdownConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Sid8Config {
    pub fn from_json_str(json: &str) -> Result<Self, Sid8Error> {
        let config: Self =
            serde_json::from_str(json).map_err(|source| Sid8Error::Parse { what: "configuration", source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Sid8Error> {
        let json = std::fs::read_to_string(path).map_err(|source| Sid8Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), Sid8Error> {
        if !self.queue_capacity.is_power_of_two() {
            return Err(Sid8Error::QueueCapacity(self.queue_capacity));
        }
        if self.sample_rate == 0 {
            return Err(Sid8Error::Config("sample_rate must be non-zero".into()));
        }
        if self.step_cycles == 0 {
            return Err(Sid8Error::Config("step_cycles must be non-zero".into()));
        }
        Ok(())
    }

    /// Settings applied to every chip.
    ///
    /// Per-chip entries exist, but all eight instances take chip 0's model
    /// and boost setting.
    #[must_use]
    pub fn shared_chip_settings(&self) -> ChipSettings {
        self.chips[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_all_defaults() {
        let config = Sid8Config::from_json_str("{}").expect("defaults");
        assert_eq!(config, Sid8Config::default());
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.queue_capacity, 1 << 17);
        assert_eq!(config.audio.start_frames, 275);
    }

    #[test]
    fn parses_models_and_modes() {
        let json = r#"{
            "output": "pwm",
            "register_read": false,
            "chips": [
                { "model": "6581", "digi_boost": true },
                {}, {}, {}, {}, {}, {},
                { "model": "6581" }
            ],
            "shutdown": { "inactivity_ms": 0 }
        }"#;
        let config = Sid8Config::from_json_str(json).expect("parse");
        assert_eq!(config.output, OutputMode::Pwm);
        assert!(!config.register_read);
        assert_eq!(config.chips[0].model, ChipModel::Mos6581);
        assert!(config.chips[0].digi_boost);
        assert_eq!(config.chips[1].model, ChipModel::Mos8580);
        assert_eq!(config.shutdown.inactivity_ms, 0);
        assert_eq!(config.shutdown.long_reset_cycles, 500_000);
    }

    #[test]
    fn bundled_pwm_config_parses() {
        let config = Sid8Config::from_json_str(include_str!("../traces/pwm.json")).expect("config");
        assert_eq!(config.output, OutputMode::Pwm);
        assert_eq!(config.audio.pwm_buffer_frames, 1024);
        assert_eq!(config.audio.yield_frames, 4410);
    }

    #[test]
    fn chip_zero_configures_everything() {
        let mut config = Sid8Config::default();
        config.chips[0].model = ChipModel::Mos6581;
        config.chips[3].digi_boost = true;
        let shared = config.shared_chip_settings();
        assert_eq!(shared.model, ChipModel::Mos6581);
        assert!(!shared.digi_boost, "other entries are not consulted");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Sid8Config::from_json_str(r#"{ "queue_capacity": 1000 }"#),
            Err(Sid8Error::QueueCapacity(1000))
        ));
        assert!(matches!(
            Sid8Config::from_json_str(r#"{ "step_cycles": 0 }"#),
            Err(Sid8Error::Config(_))
        ));
        assert!(matches!(
            Sid8Config::from_json_str(r#"{ "output": "hdmi" }"#),
            Err(Sid8Error::Parse { .. })
        ));
    }
}
