//! MOS 6581/8580 SID (Sound Interface Device) emulator.
//!
//! Three voices, each with a 24-bit phase-accumulator oscillator, four
//! waveform generators and an ADSR envelope, feed a shared multi-mode
//! filter. Every component advances once per host bus cycle; the chip
//! exposes an instantaneous signed output sample and leaves resampling to
//! the caller.
//!
//! # Register map (29 registers, $D400–$D41C)
//!
//! | Addr | Register          |
//! |------|-------------------|
//! | $00  | Voice 1 freq lo   |
//! | $01  | Voice 1 freq hi   |
//! | $02  | Voice 1 PW lo     |
//! | $03  | Voice 1 PW hi     |
//! | $04  | Voice 1 control   |
//! | $05  | Voice 1 AD        |
//! | $06  | Voice 1 SR        |
//! | $07–$0D | Voice 2 (same layout) |
//! | $0E–$14 | Voice 3 (same layout) |
//! | $15  | Filter cutoff lo  |
//! | $16  | Filter cutoff hi  |
//! | $17  | Filter routing + resonance |
//! | $18  | Volume + filter mode |
//! | $19  | Paddle X (read-only) |
//! | $1A  | Paddle Y (read-only) |
//! | $1B  | OSC3 output (read-only) |
//! | $1C  | ENV3 output (read-only) |

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

mod envelope;
mod filter;
mod voice;

pub use envelope::{Envelope, Phase};
pub use filter::Filter;
pub use voice::Voice;

use sid8_core::{Observable, ToneGenerator, Value};

/// Highest writable register ($D418).
pub const LAST_WRITABLE_REGISTER: u8 = 0x18;

/// OSC3 read-back register.
pub const REG_OSC3: u8 = 0x1B;
/// ENV3 read-back register.
pub const REG_ENV3: u8 = 0x1C;

/// Voice mask bit that enables the external audio input.
const EXT_INPUT_VOICE: u8 = 0x08;

/// Peak amplitude of one voice after centring (12-bit waveform).
const VOICE_PEAK: f32 = 2048.0;

/// SID chip revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidModel {
    /// Original NMOS part: non-linear filter, strong resonance.
    Mos6581,
    /// Later HMOS part: near-linear filter, quieter digis.
    #[default]
    Mos8580,
}

impl SidModel {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SidModel::Mos6581 => "6581",
            SidModel::Mos8580 => "8580",
        }
    }
}

/// One SID chip.
pub struct Sid {
    pub voices: [Voice; 3],
    pub envelopes: [Envelope; 3],
    pub filter: Filter,
    /// 4-bit master volume.
    pub volume: u8,
    /// Bit 7 of $D418: voice 3 is left out of the mix but keeps running.
    pub voice3_off: bool,
    model: SidModel,
    /// Bits 0–2 enable voices 1–3, bit 3 the external input.
    voice_mask: u8,
    /// External input level in 16-bit sample units.
    external_input: i32,
    /// Last value written to each register.
    registers: [u8; 32],
    /// Output sample produced by the most recent cycle.
    output: i32,
}

impl Sid {
    #[must_use]
    pub fn new(model: SidModel) -> Self {
        Self {
            voices: [Voice::new(), Voice::new(), Voice::new()],
            envelopes: [Envelope::new(), Envelope::new(), Envelope::new()],
            filter: Filter::new(model),
            volume: 0,
            voice3_off: false,
            model,
            voice_mask: 0x07,
            external_input: 0,
            registers: [0; 32],
            output: 0,
        }
    }

    #[must_use]
    pub fn model(&self) -> SidModel {
        self.model
    }

    pub fn set_model(&mut self, model: SidModel) {
        self.model = model;
        self.filter.set_model(model);
    }

    /// Enable or disable the three voices (bits 0–2) and the external
    /// input (bit 3).
    pub fn set_voice_mask(&mut self, mask: u8) {
        self.voice_mask = mask & 0x0F;
    }

    /// Level fed to the external input pin.
    pub fn set_external_input(&mut self, level: i32) {
        self.external_input = level.clamp(-32_768, 32_767);
    }

    /// "Digi boost": on the 8580, feed a constant level into the external
    /// input so that volume-register writes produce an audible step, the
    /// way the hardware trick with a resistor on EXT IN does.
    ///
    /// The 6581 produces the step on its own and ignores the setting.
    pub fn set_digi_boost(&mut self, enabled: bool) {
        if self.model != SidModel::Mos8580 {
            return;
        }
        if enabled {
            self.set_voice_mask(0x0F);
            self.set_external_input(-32_768);
        } else {
            self.set_voice_mask(0x07);
            self.set_external_input(0);
        }
    }

    /// Last value written to register `reg`.
    ///
    /// Most SID registers are write-only on the bus; this is the shadow
    /// copy the chip keeps internally.
    #[must_use]
    pub fn register(&self, reg: u8) -> u8 {
        self.registers[(reg & 0x1F) as usize]
    }

    /// Read a register from the bus side.
    ///
    /// Only OSC3 and ENV3 return live data; paddles and write-only
    /// registers read as 0.
    #[must_use]
    pub fn read(&self, reg: u8) -> u8 {
        match reg & 0x1F {
            REG_OSC3 => {
                let wave = self.voices[2].waveform_output(self.voices[1].msb());
                (wave >> 4) as u8
            }
            REG_ENV3 => self.envelopes[2].level,
            _ => 0,
        }
    }

    /// Write a register from the bus side.
    pub fn write(&mut self, reg: u8, value: u8) {
        let reg = reg & 0x1F;
        if reg > LAST_WRITABLE_REGISTER {
            return;
        }
        self.registers[reg as usize] = value;

        match reg {
            0x00..=0x14 => {
                let (voice, offset) = ((reg / 7) as usize, reg % 7);
                match offset {
                    5 => self.envelopes[voice].set_attack_decay(value),
                    6 => self.envelopes[voice].set_sustain_release(value),
                    _ => self.voices[voice].write_register(offset, value),
                }
            }
            0x15..=0x17 => self.filter.write_register(reg - 0x15, value),
            _ => {
                self.volume = value & 0x0F;
                self.filter.mode = value & 0x70;
                self.voice3_off = value & 0x80 != 0;
            }
        }
    }

    /// Power-on state, keeping model, voice mask and external input.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        for env in &mut self.envelopes {
            env.reset();
        }
        self.filter.reset();
        self.volume = 0;
        self.voice3_off = false;
        self.registers = [0; 32];
        self.output = 0;
    }

    /// Advance one bus cycle and recompute the output sample.
    pub fn tick(&mut self) {
        let prev_msb = [self.voices[0].msb(), self.voices[1].msb(), self.voices[2].msb()];

        for voice in &mut self.voices {
            voice.clock_accumulator();
            voice.clock_noise();
        }

        // Sync and ring sources: voice 3 drives voice 1, 1 drives 2, 2 drives 3.
        for (target, source) in [(0, 2), (1, 0), (2, 1)] {
            if self.voices[target].sync_enabled() {
                let source_msb = self.voices[source].msb();
                self.voices[target].apply_sync(prev_msb[source], source_msb);
            }
        }

        for (env, voice) in self.envelopes.iter_mut().zip(&self.voices) {
            env.clock(voice.gate());
        }

        let ring_msb = [self.voices[2].msb(), self.voices[0].msb(), self.voices[1].msb()];
        let mut filtered = 0.0f32;
        let mut direct = 0.0f32;

        for i in 0..3 {
            if self.voice_mask & (1 << i) == 0 || (i == 2 && self.voice3_off) {
                continue;
            }
            let wave = self.voices[i].waveform_output(ring_msb[i]);
            let centred = (i32::from(wave) - 2048) as f32;
            let amplitude = centred * f32::from(self.envelopes[i].level) / 255.0;
            if self.filter.voice_routed(i) {
                filtered += amplitude;
            } else {
                direct += amplitude;
            }
        }

        if self.voice_mask & EXT_INPUT_VOICE != 0 {
            // 16-bit input scaled to one voice's range.
            let ext = self.external_input as f32 / 16.0;
            if self.filter.ext_in {
                filtered += ext;
            } else {
                direct += ext;
            }
        }

        let mixed = (self.filter.clock(filtered) + direct) * f32::from(self.volume) / 15.0;
        let scaled = mixed / (4.0 * VOICE_PEAK) * 32_767.0;
        self.output = (scaled as i32).clamp(-32_768, 32_767);
    }

    /// Output sample of the most recent cycle.
    #[must_use]
    pub fn output(&self) -> i32 {
        self.output
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new(SidModel::default())
    }
}

impl ToneGenerator for Sid {
    fn write(&mut self, register: u8, value: u8) {
        Sid::write(self, register, value);
    }

    fn read(&mut self, register: u8) -> u8 {
        Sid::read(self, register)
    }

    fn tick(&mut self) {
        Sid::tick(self);
    }

    fn output(&self) -> i32 {
        self.output
    }
}

const QUERY_PATHS: &[&str] = &[
    "model",
    "volume",
    "output",
    "registers",
    "voice1.frequency",
    "voice1.control",
    "voice1.envelope",
    "voice2.frequency",
    "voice2.control",
    "voice2.envelope",
    "voice3.frequency",
    "voice3.control",
    "voice3.envelope",
    "filter.cutoff",
    "filter.resonance",
    "filter.mode",
];

impl Observable for Sid {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("voice") {
            let (index, field) = rest.split_once('.')?;
            let n = index.parse::<usize>().ok()?.checked_sub(1)?;
            let voice = self.voices.get(n)?;
            return match field {
                "frequency" => Some(voice.frequency.into()),
                "control" => Some(voice.control.into()),
                "envelope" => Some(self.envelopes[n].level.into()),
                _ => None,
            };
        }

        match path {
            "model" => Some(self.model.name().into()),
            "volume" => Some(self.volume.into()),
            "output" => Some(self.output.into()),
            "registers" => Some(Value::Array(
                self.registers[..=LAST_WRITABLE_REGISTER as usize]
                    .iter()
                    .map(|&r| Value::U8(r))
                    .collect(),
            )),
            "filter.cutoff" => Some(self.filter.cutoff.into()),
            "filter.resonance" => Some(self.filter.resonance.into()),
            "filter.mode" => Some(self.filter.mode.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
