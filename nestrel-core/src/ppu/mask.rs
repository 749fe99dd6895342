//! `PPUMASK` register.
//!
//! See: <https://www.nesdev.org/wiki/PPU_registers#PPUMASK>

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    // $2001 PPUMASK
    //
    // BGRs bMmG
    // |||| |||+- Grayscale (0: normal color, 1: grayscale)
    // |||| ||+-- 1: Show background in leftmost 8 pixels of screen, 0: Hide
    // |||| |+--- 1: Show sprites in leftmost 8 pixels of screen, 0: Hide
    // |||| +---- 1: Show background
    // |||+------ 1: Show sprites
    // ||+------- Emphasize red
    // |+-------- Emphasize green
    // +--------- Emphasize blue
    #[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
    #[must_use]
    pub struct PpuMask: u8 {
        const GRAYSCALE = 0x01;
        const SHOW_BG_LEFT = 0x02;
        const SHOW_SPR_LEFT = 0x04;
        const SHOW_BG = 0x08;
        const SHOW_SPR = 0x10;
        const EMPHASIZE_RED = 0x20;
        const EMPHASIZE_GREEN = 0x40;
        const EMPHASIZE_BLUE = 0x80;
    }
}

impl PpuMask {
    #[must_use]
    pub const fn show_bg(&self) -> bool {
        self.contains(Self::SHOW_BG)
    }

    #[must_use]
    pub const fn show_spr(&self) -> bool {
        self.contains(Self::SHOW_SPR)
    }

    #[must_use]
    pub const fn rendering_enabled(&self) -> bool {
        self.intersects(Self::SHOW_BG.union(Self::SHOW_SPR))
    }
}
