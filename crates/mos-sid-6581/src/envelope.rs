//! SID ADSR envelope generator.
//!
//! A rate counter divides the bus clock down to the selected step period.
//! Attack steps linearly; decay and release additionally pass through an
//! exponential divider whose period grows as the level falls, which is why
//! they take roughly three times as long as the matching attack setting.

#![allow(clippy::cast_possible_truncation)]

/// Rate counter periods in bus cycles, shared by attack, decay and release.
const RATE_PERIODS: [u16; 16] = [
    9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126, 3907, 11_720, 19_532, 31_251,
];

/// Level thresholds where the exponential divider period changes.
const EXP_STEPS: [(u8, u8); 5] = [(0x5D, 1), (0x36, 2), (0x1A, 4), (0x0E, 8), (0x06, 16)];

/// Envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope generator for one voice.
pub struct Envelope {
    /// Output level (0–255).
    pub level: u8,
    pub phase: Phase,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    rate_counter: u16,
    exp_counter: u8,
    exp_period: u8,
    prev_gate: bool,
}

impl Envelope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: 0,
            phase: Phase::Release,
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            rate_counter: 0,
            exp_counter: 0,
            exp_period: 1,
            prev_gate: false,
        }
    }

    /// Attack/decay register ($05/$0C/$13).
    pub fn set_attack_decay(&mut self, value: u8) {
        self.attack = value >> 4;
        self.decay = value & 0x0F;
    }

    /// Sustain/release register ($06/$0D/$14).
    pub fn set_sustain_release(&mut self, value: u8) {
        self.sustain = value >> 4;
        self.release = value & 0x0F;
    }

    /// Return to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Sustain level as an 8-bit envelope value (nibble × 17).
    #[must_use]
    pub fn sustain_level(&self) -> u8 {
        self.sustain * 0x11
    }

    /// Clock once per bus cycle with the voice's current gate bit.
    pub fn clock(&mut self, gate: bool) {
        if gate != self.prev_gate {
            if gate {
                self.phase = Phase::Attack;
                self.rate_counter = 0;
                self.exp_counter = 0;
            } else {
                self.phase = Phase::Release;
            }
            self.prev_gate = gate;
        }

        let rate = match self.phase {
            Phase::Attack => self.attack,
            Phase::Decay => self.decay,
            Phase::Release => self.release,
            Phase::Sustain => return,
        };

        self.rate_counter = self.rate_counter.wrapping_add(1);
        if self.rate_counter < RATE_PERIODS[rate as usize] {
            return;
        }
        self.rate_counter = 0;

        match self.phase {
            Phase::Attack => {
                self.level = self.level.saturating_add(1);
                if self.level == 0xFF {
                    self.phase = Phase::Decay;
                }
                self.update_exp_period();
            }
            Phase::Decay => {
                if !self.exp_divider_elapsed() {
                    return;
                }
                let target = self.sustain_level();
                if self.level > target {
                    self.level -= 1;
                    self.update_exp_period();
                }
                if self.level <= target {
                    self.level = target;
                    self.phase = Phase::Sustain;
                }
            }
            Phase::Release => {
                if self.exp_divider_elapsed() && self.level > 0 {
                    self.level -= 1;
                    self.update_exp_period();
                }
            }
            Phase::Sustain => {}
        }
    }

    fn exp_divider_elapsed(&mut self) -> bool {
        self.exp_counter = self.exp_counter.wrapping_add(1);
        if self.exp_counter < self.exp_period {
            return false;
        }
        self.exp_counter = 0;
        true
    }

    fn update_exp_period(&mut self) {
        self.exp_period = EXP_STEPS
            .iter()
            .find(|&&(threshold, _)| self.level >= threshold)
            .map_or(30, |&(_, period)| period);
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(env: &mut Envelope, gate: bool, cycles: u32) {
        for _ in 0..cycles {
            env.clock(gate);
        }
    }

    #[test]
    fn register_nibbles_split() {
        let mut env = Envelope::new();
        env.set_attack_decay(0xA5);
        env.set_sustain_release(0x3C);
        assert_eq!((env.attack, env.decay), (0x0A, 0x05));
        assert_eq!((env.sustain, env.release), (0x03, 0x0C));
        assert_eq!(env.sustain_level(), 0x33);
    }

    #[test]
    fn attack_then_decay_to_sustain() {
        let mut env = Envelope::new();
        env.set_sustain_release(0x80);
        run(&mut env, true, 9 * 256);
        assert!(matches!(env.phase, Phase::Decay | Phase::Sustain));
        run(&mut env, true, 20_000);
        assert_eq!(env.phase, Phase::Sustain);
        assert_eq!(env.level, 0x88);
    }

    #[test]
    fn release_reaches_zero() {
        let mut env = Envelope::new();
        env.set_sustain_release(0xF0);
        run(&mut env, true, 3000);
        assert_eq!(env.level, 0xFF);
        run(&mut env, false, 50_000);
        assert_eq!(env.level, 0);
        assert_eq!(env.phase, Phase::Release);
    }
}
