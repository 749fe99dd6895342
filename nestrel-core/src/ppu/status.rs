//! `PPUSTATUS` register.
//!
//! See: <https://www.nesdev.org/wiki/PPU_registers#PPUSTATUS>

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    // $2002 PPUSTATUS
    //
    // VSO. ....
    // |||+-++++- PPU open bus
    // ||+------- Sprite overflow
    // |+-------- Sprite 0 hit
    // +--------- Vblank started
    #[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
    #[must_use]
    pub struct PpuStatus: u8 {
        const SPR_OVERFLOW = 0x20;
        const SPR_ZERO_HIT = 0x40;
        const VBLANK_STARTED = 0x80;
    }
}

impl PpuStatus {
    #[must_use]
    pub const fn in_vblank(&self) -> bool {
        self.contains(Self::VBLANK_STARTED)
    }
}
