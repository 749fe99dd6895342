//! APU delta modulation channel.
//!
//! See: <https://www.nesdev.org/wiki/APU_DMC>

use crate::common::{NesRegion, Reset, ResetKind};
use serde::{Deserialize, Serialize};

/// APU DMC: 1-bit delta-coded sample playback.
///
/// Sample bytes are fetched through the bus between APU clocks via
/// `dma_addr`/`load_buffer`; the CPU stall cycles of real hardware DMA are not
/// modeled.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Dmc {
    pub region: NesRegion,
    pub period: u16,
    pub timer: u16,
    pub irq_enabled: bool,
    pub irq_pending: bool,
    pub looping: bool,
    pub output_level: u8,
    pub sample_addr: u16,
    pub sample_len: u16,
    pub current_addr: u16,
    pub bytes_remaining: u16,
    pub buffer: Option<u8>,
    pub shift: u8,
    pub bits_remaining: u8,
    pub silence: bool,
}

impl Dmc {
    const NTSC_PERIODS: [u16; 16] = [
        428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
    ];
    const PAL_PERIODS: [u16; 16] = [
        398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
    ];

    pub const fn new(region: NesRegion) -> Self {
        Self {
            region,
            period: Self::NTSC_PERIODS[0],
            timer: 0,
            irq_enabled: false,
            irq_pending: false,
            looping: false,
            output_level: 0,
            sample_addr: 0xC000,
            sample_len: 1,
            current_addr: 0xC000,
            bytes_remaining: 0,
            buffer: None,
            shift: 0,
            bits_remaining: 8,
            silence: true,
        }
    }

    const fn periods(&self) -> &'static [u16; 16] {
        match self.region {
            NesRegion::Auto | NesRegion::Ntsc => &Self::NTSC_PERIODS,
            NesRegion::Pal => &Self::PAL_PERIODS,
        }
    }

    /// `$4010`
    pub fn write_timer(&mut self, val: u8) {
        self.irq_enabled = val & 0x80 == 0x80;
        if !self.irq_enabled {
            self.irq_pending = false;
        }
        self.looping = val & 0x40 == 0x40;
        self.period = self.periods()[(val & 0x0F) as usize];
    }

    /// `$4011`
    pub fn write_output(&mut self, val: u8) {
        self.output_level = val & 0x7F;
    }

    /// `$4012`
    pub fn write_addr(&mut self, val: u8) {
        self.sample_addr = 0xC000 | (u16::from(val) << 6);
    }

    /// `$4013`
    pub fn write_length(&mut self, val: u8) {
        self.sample_len = (u16::from(val) << 4) | 1;
    }

    /// `$4015` enable bit.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart();
        }
        self.irq_pending = false;
    }

    fn restart(&mut self) {
        self.current_addr = self.sample_addr;
        self.bytes_remaining = self.sample_len;
    }

    #[must_use]
    pub const fn active(&self) -> bool {
        self.bytes_remaining > 0
    }

    /// Whether the sample buffer needs a byte fetched from PRG memory.
    #[must_use]
    pub const fn needs_byte(&self) -> bool {
        self.buffer.is_none() && self.bytes_remaining > 0
    }

    #[must_use]
    pub const fn dma_addr(&self) -> u16 {
        self.current_addr
    }

    /// Deliver a fetched sample byte.
    pub fn load_buffer(&mut self, val: u8) {
        self.buffer = Some(val);
        // Address wraps from $FFFF back to $8000
        self.current_addr = if self.current_addr == 0xFFFF {
            0x8000
        } else {
            self.current_addr + 1
        };
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enabled {
                self.irq_pending = true;
            }
        }
    }

    /// Timer clock, every other CPU cycle.
    pub fn clock_timer(&mut self) {
        if self.timer > 0 {
            self.timer -= 1;
            return;
        }
        self.timer = self.period / 2;

        if !self.silence {
            if self.shift & 0x01 == 0x01 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.buffer.take() {
                Some(byte) => {
                    self.silence = false;
                    self.shift = byte;
                }
                None => self.silence = true,
            }
        }
    }

    #[must_use]
    pub const fn output(&self) -> u8 {
        self.output_level
    }
}

impl Default for Dmc {
    fn default() -> Self {
        Self::new(NesRegion::Ntsc)
    }
}

impl Reset for Dmc {
    fn reset(&mut self, _kind: ResetKind) {
        let region = self.region;
        *self = Self::new(region);
    }
}
