//! APU noise channel.
//!
//! See: <https://www.nesdev.org/wiki/APU_Noise>

use crate::{
    apu::{envelope::Envelope, length_counter::LengthCounter},
    common::{NesRegion, Reset, ResetKind},
};
use serde::{Deserialize, Serialize};

/// APU noise channel: linear-feedback shift register noise.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Noise {
    pub region: NesRegion,
    pub period: u16,
    pub timer: u16,
    pub shift: u16, // 15-bit LFSR, seeded to 1
    pub mode_7bit: bool,
    pub length: LengthCounter,
    pub envelope: Envelope,
}

impl Noise {
    const NTSC_PERIODS: [u16; 16] = [
        4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
    ];
    const PAL_PERIODS: [u16; 16] = [
        4, 8, 14, 30, 60, 88, 118, 148, 188, 236, 354, 472, 708, 944, 1890, 3778,
    ];

    pub const fn new(region: NesRegion) -> Self {
        Self {
            region,
            period: Self::NTSC_PERIODS[0],
            timer: 0,
            shift: 1,
            mode_7bit: false,
            length: LengthCounter::new(),
            envelope: Envelope::new(),
        }
    }

    const fn periods(&self) -> &'static [u16; 16] {
        match self.region {
            NesRegion::Auto | NesRegion::Ntsc => &Self::NTSC_PERIODS,
            NesRegion::Pal => &Self::PAL_PERIODS,
        }
    }

    /// `$400C`
    pub fn write_ctrl(&mut self, val: u8) {
        self.length.halt = val & 0x20 == 0x20;
        self.envelope.write_ctrl(val);
    }

    /// `$400E`
    pub fn write_timer(&mut self, val: u8) {
        self.mode_7bit = val & 0x80 == 0x80;
        self.period = self.periods()[(val & 0x0F) as usize];
    }

    /// `$400F`
    pub fn write_length(&mut self, val: u8) {
        self.length.load(val);
        self.envelope.start = true;
    }

    /// Timer clock, every other CPU cycle.
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.period;
            let tap = if self.mode_7bit { 6 } else { 1 };
            let feedback = (self.shift & 0x01) ^ ((self.shift >> tap) & 0x01);
            self.shift = (self.shift >> 1) | (feedback << 14);
        } else {
            self.timer -= 1;
        }
    }

    pub fn clock_quarter_frame(&mut self) {
        self.envelope.clock();
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();
    }

    #[must_use]
    pub fn output(&self) -> u8 {
        if self.length.active() && self.shift & 0x01 == 0x00 {
            self.envelope.output()
        } else {
            0
        }
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new(NesRegion::Ntsc)
    }
}

impl Reset for Noise {
    fn reset(&mut self, kind: ResetKind) {
        self.length.reset(kind);
        self.envelope.reset(kind);
        self.timer = 0;
        self.shift = 1;
        self.mode_7bit = false;
    }
}
