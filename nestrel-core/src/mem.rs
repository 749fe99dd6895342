//! Memory helpers: power-up RAM state and bank-switched memory windows.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[must_use]
pub enum Error {
    #[error("bank window must be a power of two, got {0}")]
    InvalidWindow(usize),
    #[error("bank size must be non-zero")]
    EmptyBanks,
}

#[derive(Error, Debug)]
#[must_use]
#[error("failed to parse `RamState`")]
pub struct ParseRamStateError;

/// Power-up state of on-board and cartridge RAM.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum RamState {
    #[default]
    AllZeros,
    AllOnes,
    Random,
}

impl RamState {
    pub const fn as_slice() -> &'static [Self] {
        &[Self::AllZeros, Self::AllOnes, Self::Random]
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AllZeros => "all-zeros",
            Self::AllOnes => "all-ones",
            Self::Random => "random",
        }
    }

    /// Fills data slice based on `RamState`.
    pub fn fill(data: &mut [u8], state: Self) {
        match state {
            Self::AllZeros => data.fill(0x00),
            Self::AllOnes => data.fill(0xFF),
            Self::Random => {
                let mut rng = rand::thread_rng();
                rng.fill(data);
            }
        }
    }
}

impl AsRef<str> for RamState {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for RamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AllZeros => "All $00",
            Self::AllOnes => "All $FF",
            Self::Random => "Random",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<&str> for RamState {
    type Error = ParseRamStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "all-zeros" => Ok(Self::AllZeros),
            "all-ones" => Ok(Self::AllOnes),
            "random" => Ok(Self::Random),
            _ => Err(ParseRamStateError),
        }
    }
}

/// Bank-switched view over a flat memory region.
///
/// Divides `[start, end]` in the address space into fixed-size windows, each
/// pointing at a bank of the backing memory. Mappers re-point windows on bank
/// select writes; `translate` converts a bus address into a backing offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct Banks {
    start: usize,
    end: usize,
    window: usize,
    shift: u32,
    bank_count: usize,
    banks: Vec<usize>,
}

impl Banks {
    pub fn new(start: usize, end: usize, capacity: usize, window: usize) -> Result<Self, Error> {
        if !window.is_power_of_two() {
            return Err(Error::InvalidWindow(window));
        }
        if capacity == 0 {
            return Err(Error::EmptyBanks);
        }
        let slots = (end - start + 1) / window;
        let mut banks = Self {
            start,
            end,
            window,
            shift: window.trailing_zeros(),
            bank_count: capacity.div_ceil(window),
            banks: vec![0; slots],
        };
        for slot in 0..slots {
            banks.set(slot, slot);
        }
        Ok(banks)
    }

    /// Point `slot` at `bank`, wrapping past the end of the backing memory.
    pub fn set(&mut self, slot: usize, bank: usize) {
        self.banks[slot] = (bank % self.bank_count) * self.window;
    }

    /// Point consecutive slots `[first, last]` at consecutive banks starting at `bank`.
    pub fn set_range(&mut self, first: usize, last: usize, bank: usize) {
        for (offset, slot) in (first..=last).enumerate() {
            self.set(slot, bank + offset);
        }
    }

    /// Index of the last bank in the backing memory.
    #[must_use]
    pub const fn last(&self) -> usize {
        self.bank_count - 1
    }

    /// Translate a bus address into an offset into the backing memory.
    #[must_use]
    pub fn translate(&self, addr: u16) -> usize {
        let offset = addr as usize - self.start;
        self.banks[offset >> self.shift] | (offset & (self.window - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_ram_states() {
        let mut data = vec![0xAA; 8];
        RamState::fill(&mut data, RamState::AllZeros);
        assert_eq!(data, vec![0x00; 8], "all zeros");
        RamState::fill(&mut data, RamState::AllOnes);
        assert_eq!(data, vec![0xFF; 8], "all ones");
    }

    #[test]
    fn bank_translate() {
        // 32K of PRG-ROM banked into $8000-$FFFF with 16K windows
        let banks = Banks::new(0x8000, 0xFFFF, 0x8000, 0x4000).unwrap();
        assert_eq!(banks.translate(0x8000), 0x0000, "first bank start");
        assert_eq!(banks.translate(0xBFFF), 0x3FFF, "first bank end");
        assert_eq!(banks.translate(0xC000), 0x4000, "second bank start");
        assert_eq!(banks.translate(0xFFFF), 0x7FFF, "second bank end");
    }

    #[test]
    fn bank_switching_wraps() {
        // 16K backing memory, two 16K windows: both windows alias bank 0
        let mut banks = Banks::new(0x8000, 0xFFFF, 0x4000, 0x4000).unwrap();
        assert_eq!(banks.translate(0xC000), 0x0000, "mirrored bank");
        banks.set(0, 5);
        assert_eq!(banks.translate(0x8000), 0x0000, "bank select wraps");
    }

    #[test]
    fn bank_set_range() {
        let mut banks = Banks::new(0x0000, 0x1FFF, 0x4000, 0x0400).unwrap();
        banks.set_range(0, 1, 4);
        assert_eq!(banks.translate(0x0000), 4 * 0x0400, "range start");
        assert_eq!(banks.translate(0x0400), 5 * 0x0400, "range end");
    }

    #[test]
    fn invalid_window_rejected() {
        assert!(Banks::new(0x8000, 0xFFFF, 0x8000, 0x3000).is_err(), "window not power of two");
    }
}
