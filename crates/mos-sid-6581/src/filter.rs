//! SID multi-mode filter.
//!
//! A two-integrator state-variable filter. Low-pass, band-pass and
//! high-pass outputs are available at once and summed according to the
//! mode bits in $D418. Cutoff and resonance come from $D415–$D417.
//!
//! The 6581 cutoff curve is strongly non-linear with a floor of roughly
//! 200 Hz; the 8580 curve is close to linear over a wider range and has a
//! lower resonance ceiling.

#![allow(clippy::cast_precision_loss)]

use crate::SidModel;

/// Filter mode bits in $D418.
const MODE_LP: u8 = 0x10;
const MODE_BP: u8 = 0x20;
const MODE_HP: u8 = 0x40;

/// State-variable filter.
pub struct Filter {
    /// 11-bit cutoff.
    pub cutoff: u16,
    /// 4-bit resonance.
    pub resonance: u8,
    /// Mode bits (LP/BP/HP) as written to $D418.
    pub mode: u8,
    /// Voices 1–3 routed through the filter (bits 0–2 of $D417).
    pub routing: u8,
    /// External input routed through the filter (bit 3 of $D417).
    pub ext_in: bool,
    model: SidModel,
    lp: f32,
    bp: f32,
}

impl Filter {
    #[must_use]
    pub fn new(model: SidModel) -> Self {
        Self {
            cutoff: 0,
            resonance: 0,
            mode: 0,
            routing: 0,
            ext_in: false,
            model,
            lp: 0.0,
            bp: 0.0,
        }
    }

    /// Write a filter register, `offset` 0–2 for $D415–$D417.
    pub fn write_register(&mut self, offset: u8, value: u8) {
        match offset {
            0 => self.cutoff = (self.cutoff & 0x7F8) | u16::from(value & 0x07),
            1 => self.cutoff = (self.cutoff & 0x007) | (u16::from(value) << 3),
            2 => {
                self.resonance = value >> 4;
                self.routing = value & 0x07;
                self.ext_in = value & 0x08 != 0;
            }
            _ => {}
        }
    }

    pub fn set_model(&mut self, model: SidModel) {
        self.model = model;
    }

    /// Clear registers and integrator state.
    pub fn reset(&mut self) {
        *self = Self::new(self.model);
    }

    /// Returns true if voice `n` (0–2) passes through the filter.
    #[must_use]
    pub fn voice_routed(&self, voice: usize) -> bool {
        self.routing & (1 << voice) != 0
    }

    /// Run one bus cycle of input through the filter and return the sum of
    /// the enabled outputs.
    pub fn clock(&mut self, input: f32) -> f32 {
        let fc = self.cutoff_coefficient();
        let q = self.damping();

        let hp = input - self.lp - q * self.bp;
        self.bp += fc * hp;
        self.lp += fc * self.bp;

        [(MODE_LP, self.lp), (MODE_BP, self.bp), (MODE_HP, hp)]
            .iter()
            .filter(|(bit, _)| self.mode & bit != 0)
            .map(|&(_, out)| out)
            .sum()
    }

    fn cutoff_coefficient(&self) -> f32 {
        let x = f32::from(self.cutoff) / 2047.0;
        match self.model {
            // Quadratic fit of the 6581 die measurements.
            SidModel::Mos6581 => (0.003 + 0.02 * x + 0.33 * x * x).clamp(0.002, 0.36),
            SidModel::Mos8580 => 0.001 + 0.549 * x,
        }
    }

    /// Feedback coefficient; lower values ring more.
    fn damping(&self) -> f32 {
        let r = f32::from(self.resonance) / 15.0;
        match self.model {
            SidModel::Mos6581 => 0.7 + r,
            SidModel::Mos8580 => 0.7 + 0.7 * r,
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(SidModel::default())
    }
}
