//! Stereo mixer for the eight chip outputs.
//!
//! Odd chips go left, even chips go right. Each side sums four chips,
//! halves the sum and hard-clips to ±32767. Gain and balance belong to the
//! audio sink, not here.

use crate::bus::CHIP_COUNT;

/// Largest magnitude a mixed channel may reach.
pub const CLIP_LEVEL: i32 = 32_767;

/// One interleaved stereo sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StereoFrame {
    pub left: i16,
    pub right: i16,
}

impl StereoFrame {
    #[must_use]
    pub const fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }
}

/// Sum the four chips of one side, halve and clip.
fn mix_side(outputs: &[i32; CHIP_COUNT], first: usize) -> i16 {
    let sum: i32 = outputs.iter().skip(first).step_by(2).sum();
    (sum >> 1).clamp(-CLIP_LEVEL, CLIP_LEVEL) as i16
}

/// Mix eight chip outputs into one stereo frame.
#[must_use]
pub fn mix(outputs: &[i32; CHIP_COUNT]) -> StereoFrame {
    StereoFrame {
        left: mix_side(outputs, 1),
        right: mix_side(outputs, 0),
    }
}
