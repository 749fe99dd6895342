//! APU pulse channel.
//!
//! See: <https://www.nesdev.org/wiki/APU_Pulse>

use crate::{
    apu::{envelope::Envelope, length_counter::LengthCounter},
    common::{Reset, ResetKind},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum PulseChannel {
    One,
    Two,
}

#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Sweep {
    pub enabled: bool,
    pub period: u8,
    pub negate: bool,
    pub shift: u8,
    pub divider: u8,
    pub reload: bool,
}

/// APU pulse channel: square wave with envelope, sweep and length counter.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Pulse {
    pub channel: PulseChannel,
    pub period: u16,
    pub timer: u16,
    pub duty: u8,       // Select row in DUTY_TABLE
    pub duty_cycle: u8, // Select column in DUTY_TABLE
    pub length: LengthCounter,
    pub envelope: Envelope,
    pub sweep: Sweep,
}

impl Pulse {
    const DUTY_TABLE: [[u8; 8]; 4] = [
        [0, 1, 0, 0, 0, 0, 0, 0],
        [0, 1, 1, 0, 0, 0, 0, 0],
        [0, 1, 1, 1, 1, 0, 0, 0],
        [1, 0, 0, 1, 1, 1, 1, 1],
    ];

    pub const fn new(channel: PulseChannel) -> Self {
        Self {
            channel,
            period: 0,
            timer: 0,
            duty: 0,
            duty_cycle: 0,
            length: LengthCounter::new(),
            envelope: Envelope::new(),
            sweep: Sweep {
                enabled: false,
                period: 0,
                negate: false,
                shift: 0,
                divider: 0,
                reload: false,
            },
        }
    }

    fn target_period(&self) -> u16 {
        let delta = self.period >> self.sweep.shift;
        if self.sweep.negate {
            // Pulse 1 uses one's complement, pulse 2 two's complement
            match self.channel {
                PulseChannel::One => self.period.wrapping_sub(delta).wrapping_sub(1),
                PulseChannel::Two => self.period.wrapping_sub(delta),
            }
        } else {
            self.period.wrapping_add(delta)
        }
    }

    fn muted(&self) -> bool {
        self.period < 8 || (!self.sweep.negate && self.target_period() > 0x7FF)
    }

    /// `$4000`/`$4004`
    pub fn write_ctrl(&mut self, val: u8) {
        self.duty = (val >> 6) & 0x03;
        self.length.halt = val & 0x20 == 0x20;
        self.envelope.write_ctrl(val);
    }

    /// `$4001`/`$4005`
    pub fn write_sweep(&mut self, val: u8) {
        self.sweep.enabled = val & 0x80 == 0x80;
        self.sweep.period = (val >> 4) & 0x07;
        self.sweep.negate = val & 0x08 == 0x08;
        self.sweep.shift = val & 0x07;
        self.sweep.reload = true;
    }

    /// `$4002`/`$4006`
    pub fn write_timer_lo(&mut self, val: u8) {
        self.period = (self.period & 0xFF00) | u16::from(val);
    }

    /// `$4003`/`$4007`
    pub fn write_timer_hi(&mut self, val: u8) {
        self.period = (self.period & 0x00FF) | (u16::from(val & 0x07) << 8);
        self.length.load(val);
        self.duty_cycle = 0;
        self.envelope.start = true;
    }

    /// Timer clock, every other CPU cycle.
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.period;
            self.duty_cycle = (self.duty_cycle + 1) & 0x07;
        } else {
            self.timer -= 1;
        }
    }

    pub fn clock_quarter_frame(&mut self) {
        self.envelope.clock();
    }

    pub fn clock_half_frame(&mut self) {
        self.sweep.divider = self.sweep.divider.wrapping_sub(1);
        if self.sweep.divider == 0 || self.sweep.reload {
            if self.sweep.divider == 0
                && self.sweep.enabled
                && self.sweep.shift > 0
                && !self.muted()
            {
                self.period = self.target_period() & 0x07FF;
            }
            self.sweep.divider = self.sweep.period + 1;
            self.sweep.reload = false;
        }
        self.length.clock();
    }

    #[must_use]
    pub fn output(&self) -> u8 {
        if self.length.active()
            && !self.muted()
            && Self::DUTY_TABLE[self.duty as usize][self.duty_cycle as usize] == 1
        {
            self.envelope.output()
        } else {
            0
        }
    }
}

impl Reset for Pulse {
    fn reset(&mut self, kind: ResetKind) {
        self.envelope.reset(kind);
        self.length.reset(kind);
        self.period = 0;
        self.timer = 0;
        self.duty = 0;
        self.duty_cycle = 0;
        self.sweep = Sweep::default();
    }
}
