//! Host bus signals and the eight-chip address mapping.
//!
//! All eight chips share one 32-register window. The chip index is spread
//! over three address lines so that the common stereo addresses of a
//! second SID land on a different chip:
//!
//! | Chip bit | Address line |
//! |----------|--------------|
//! | 0        | A5           |
//! | 1        | A7           |
//! | 2        | A8           |
//!
//! A6 is not decoded, so every register has a mirror 64 bytes up. The
//! register number is A0–A4.

/// Number of emulated chips.
pub const CHIP_COUNT: usize = 8;

/// Registers per chip window.
pub const REGISTER_COUNT: usize = 32;

/// Address lines seen by the decoder (A0–A8).
pub const ADDRESS_MASK: u16 = 0x01FF;

const REGISTER_MASK: u16 = 0x001F;

/// One sample of the host bus lines, taken once per host cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusLines {
    /// Address lines A0–A12 (only A0–A8 are decoded).
    pub address: u16,
    /// Data lines D0–D7, valid on write cycles.
    pub data: u8,
    /// R/W line: high for a host read.
    pub read: bool,
    /// The cycle addresses the emulated chip region.
    pub chip_select: bool,
    /// The host reset line is asserted.
    pub reset: bool,
}

impl BusLines {
    /// A cycle with no chip access.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            address: 0,
            data: 0,
            read: true,
            chip_select: false,
            reset: false,
        }
    }

    /// A host write to the chip region.
    #[must_use]
    pub const fn write(address: u16, data: u8) -> Self {
        Self {
            address,
            data,
            read: false,
            chip_select: true,
            reset: false,
        }
    }

    /// A host read from the chip region.
    #[must_use]
    pub const fn read(address: u16) -> Self {
        Self {
            address,
            data: 0,
            read: true,
            chip_select: true,
            reset: false,
        }
    }

    /// An idle cycle with the reset line held.
    #[must_use]
    pub const fn reset() -> Self {
        let mut lines = Self::idle();
        lines.reset = true;
        lines
    }
}

/// Split a bus address into `(chip, register)`.
#[must_use]
pub const fn decode_address(address: u16) -> (u8, u8) {
    let a = address & ADDRESS_MASK;
    let chip = ((a >> 6) & 0b110) | ((a >> 5) & 0b001);
    (chip as u8, (a & REGISTER_MASK) as u8)
}

/// Inverse of [`decode_address`], with A6 low.
#[must_use]
pub const fn encode_address(chip: u8, register: u8) -> u16 {
    let chip = chip as u16 & 0b111;
    ((chip & 0b110) << 6) | ((chip & 0b001) << 5) | (register as u16 & REGISTER_MASK)
}

/// A host write captured by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusEvent {
    /// Target chip, 0–7.
    pub chip: u8,
    /// Target register, 0–31.
    pub register: u8,
    pub value: u8,
    /// Host cycle of the write.
    pub at_cycle: u64,
}

impl BusEvent {
    /// Pack chip, register and value into one word: `value | reg << 8 | chip << 16`.
    #[must_use]
    pub const fn pack(&self) -> u32 {
        self.value as u32 | ((self.register as u32 & 0x1F) << 8) | ((self.chip as u32 & 0x07) << 16)
    }

    #[must_use]
    pub const fn unpack(word: u32, at_cycle: u64) -> Self {
        Self {
            chip: ((word >> 16) & 0x07) as u8,
            register: ((word >> 8) & 0x1F) as u8,
            value: word as u8,
            at_cycle,
        }
    }
}
