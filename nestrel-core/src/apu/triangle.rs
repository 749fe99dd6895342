//! APU triangle channel.
//!
//! See: <https://www.nesdev.org/wiki/APU_Triangle>

use crate::{
    apu::length_counter::LengthCounter,
    common::{Reset, ResetKind},
};
use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct LinearCounter {
    pub control: bool,
    pub reload: bool,
    pub reload_value: u8,
    pub counter: u8,
}

/// APU triangle channel: 32-step triangle wave with linear and length counters.
#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Triangle {
    pub period: u16,
    pub timer: u16,
    pub step: u8, // 0..32 through SEQUENCE
    pub linear: LinearCounter,
    pub length: LengthCounter,
}

impl Triangle {
    const SEQUENCE: [u8; 32] = [
        15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10,
        11, 12, 13, 14, 15,
    ];

    pub const fn new() -> Self {
        Self {
            period: 0,
            timer: 0,
            step: 0,
            linear: LinearCounter {
                control: false,
                reload: false,
                reload_value: 0,
                counter: 0,
            },
            length: LengthCounter::new(),
        }
    }

    /// `$4008`
    pub fn write_linear_counter(&mut self, val: u8) {
        self.linear.control = val & 0x80 == 0x80;
        self.length.halt = self.linear.control;
        self.linear.reload_value = val & 0x7F;
    }

    /// `$400A`
    pub fn write_timer_lo(&mut self, val: u8) {
        self.period = (self.period & 0xFF00) | u16::from(val);
    }

    /// `$400B`
    pub fn write_timer_hi(&mut self, val: u8) {
        self.period = (self.period & 0x00FF) | (u16::from(val & 0x07) << 8);
        self.length.load(val);
        self.linear.reload = true;
    }

    /// Timer clock, every CPU cycle.
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.period;
            if self.length.active() && self.linear.counter > 0 {
                self.step = (self.step + 1) & 0x1F;
            }
        } else {
            self.timer -= 1;
        }
    }

    pub fn clock_quarter_frame(&mut self) {
        if self.linear.reload {
            self.linear.counter = self.linear.reload_value;
        } else if self.linear.counter > 0 {
            self.linear.counter -= 1;
        }
        if !self.linear.control {
            self.linear.reload = false;
        }
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();
    }

    #[must_use]
    pub fn output(&self) -> u8 {
        // Ultrasonic periods are audible as popping; silence them
        if self.period < 2 {
            7
        } else {
            Self::SEQUENCE[self.step as usize]
        }
    }
}

impl Reset for Triangle {
    fn reset(&mut self, kind: ResetKind) {
        self.length.reset(kind);
        self.linear = LinearCounter::default();
        self.period = 0;
        self.timer = 0;
        self.step = 0;
    }
}
