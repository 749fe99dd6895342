//! `PPUCTRL` register.
//!
//! See: <https://www.nesdev.org/wiki/PPU_registers#PPUCTRL>

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    // $2000 PPUCTRL
    //
    // VPHB SINN
    // |||| ||++- Base nametable address (0 = $2000; 1 = $2400; 2 = $2800; 3 = $2C00)
    // |||| |+--- VRAM increment per CPU read/write of PPUDATA (0: add 1; 1: add 32)
    // |||| +---- Sprite pattern table for 8x8 sprites (0: $0000; 1: $1000)
    // |||+------ Background pattern table (0: $0000; 1: $1000)
    // ||+------- Sprite size (0: 8x8; 1: 8x16)
    // |+-------- PPU master/slave select
    // +--------- Generate NMI at start of vblank (0: off; 1: on)
    #[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
    #[must_use]
    pub struct PpuCtrl: u8 {
        const NAMETABLE1 = 0x01;
        const NAMETABLE2 = 0x02;
        const VRAM_INCREMENT = 0x04;
        const SPR_SELECT = 0x08;
        const BG_SELECT = 0x10;
        const SPR_HEIGHT = 0x20;
        const MASTER_SLAVE = 0x40;
        const NMI_ENABLE = 0x80;
    }
}

impl PpuCtrl {
    #[must_use]
    pub const fn nametable_addr(&self) -> u16 {
        0x2000 | (((self.bits() & 0x03) as u16) << 10)
    }

    #[must_use]
    pub const fn vram_increment(&self) -> u16 {
        if self.contains(Self::VRAM_INCREMENT) {
            32
        } else {
            1
        }
    }

    #[must_use]
    pub const fn spr_select(&self) -> u16 {
        if self.contains(Self::SPR_SELECT) {
            0x1000
        } else {
            0x0000
        }
    }

    #[must_use]
    pub const fn bg_select(&self) -> u16 {
        if self.contains(Self::BG_SELECT) {
            0x1000
        } else {
            0x0000
        }
    }

    #[must_use]
    pub const fn spr_height(&self) -> u16 {
        if self.contains(Self::SPR_HEIGHT) {
            16
        } else {
            8
        }
    }

    #[must_use]
    pub const fn nmi_enabled(&self) -> bool {
        self.contains(Self::NMI_ENABLE)
    }
}
