//! Core traits and types for bus-clocked sound chip emulation.
//!
//! Everything is timed in host bus cycles. Chips advance one cycle per host
//! cycle, and audio samples are derived from the measured host clock.

mod clock;
mod observable;
mod tone;

pub use clock::{FRACTION_BITS, HostClock};
pub use observable::{Observable, Value};
pub use tone::ToneGenerator;
