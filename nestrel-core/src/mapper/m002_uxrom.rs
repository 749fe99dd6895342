//! `UxROM` (Mapper 002).
//!
//! <https://wiki.nesdev.com/w/index.php/UxROM>

use crate::{
    cart::{self, Cart},
    common::{Regional, Reset, ResetKind},
    mapper::{Mapped, MappedRead, MappedWrite, Mapper, MemMap},
    mem::Banks,
    ppu::Mirroring,
};
use serde::{Deserialize, Serialize};

/// `UxROM` (Mapper 002).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Uxrom {
    pub mirroring: Mirroring,
    pub prg_rom_banks: Banks,
}

impl Uxrom {
    const PRG_WINDOW: usize = 16 * 1024;
    const CHR_RAM_SIZE: usize = 8 * 1024;

    pub fn load(cart: &mut Cart) -> Result<Mapper, cart::Error> {
        if !cart.has_chr_rom() {
            cart.add_chr_ram(Self::CHR_RAM_SIZE);
        }
        let mut uxrom = Self {
            mirroring: cart.mirroring(),
            prg_rom_banks: Banks::new(0x8000, 0xFFFF, cart.prg_rom.len(), Self::PRG_WINDOW)?,
        };
        let last = uxrom.prg_rom_banks.last();
        uxrom.prg_rom_banks.set(1, last);
        Ok(uxrom.into())
    }
}

impl MemMap for Uxrom {
    // PPU $0000..=$1FFF 8K fixed CHR-ROM/CHR-RAM bank
    // CPU $8000..=$BFFF 16K switchable PRG-ROM bank
    // CPU $C000..=$FFFF 16K PRG-ROM bank fixed to last

    fn map_peek(&self, addr: u16) -> MappedRead {
        match addr {
            0x0000..=0x1FFF => MappedRead::Chr(addr as usize),
            0x8000..=0xFFFF => MappedRead::PrgRom(self.prg_rom_banks.translate(addr)),
            _ => MappedRead::Bus,
        }
    }

    fn map_write(&mut self, addr: u16, val: u8) -> MappedWrite {
        match addr {
            0x0000..=0x1FFF => MappedWrite::ChrRam(addr as usize, val),
            0x8000..=0xFFFF => {
                self.prg_rom_banks.set(0, val as usize);
                MappedWrite::Bus
            }
            _ => MappedWrite::Bus,
        }
    }
}

impl Mapped for Uxrom {
    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.mirroring = mirroring;
    }
}

impl Regional for Uxrom {}

impl Reset for Uxrom {
    fn reset(&mut self, _kind: ResetKind) {
        self.prg_rom_banks.set(0, 0);
    }
}
