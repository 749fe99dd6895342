//! APU envelope generator.
//!
//! See: <https://www.nesdev.org/wiki/APU_Envelope>

use crate::common::{Reset, ResetKind};
use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Envelope {
    pub start: bool,
    pub looping: bool,
    pub constant: bool,
    pub volume: u8, // Doubles as the divider period
    pub divider: u8,
    pub decay: u8,
}

impl Envelope {
    pub const fn new() -> Self {
        Self {
            start: false,
            looping: false,
            constant: false,
            volume: 0,
            divider: 0,
            decay: 0,
        }
    }

    /// `$4000`/`$4004`/`$400C` low six bits.
    pub fn write_ctrl(&mut self, val: u8) {
        self.looping = val & 0x20 == 0x20;
        self.constant = val & 0x10 == 0x10;
        self.volume = val & 0x0F;
    }

    /// Quarter-frame clock.
    pub fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.volume;
        } else if self.divider > 0 {
            self.divider -= 1;
        } else {
            self.divider = self.volume;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        }
    }

    #[must_use]
    pub const fn output(&self) -> u8 {
        if self.constant {
            self.volume
        } else {
            self.decay
        }
    }
}

impl Reset for Envelope {
    fn reset(&mut self, _kind: ResetKind) {
        *self = Self::new();
    }
}
