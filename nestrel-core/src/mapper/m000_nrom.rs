//! `NROM` (Mapper 000).
//!
//! <https://wiki.nesdev.com/w/index.php/NROM>

use crate::{
    cart::{self, Cart},
    common::{Regional, Reset},
    mapper::{Mapped, MappedRead, MappedWrite, Mapper, MemMap},
    mem::Banks,
    ppu::Mirroring,
};
use serde::{Deserialize, Serialize};

/// `NROM` (Mapper 000).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Nrom {
    pub mirroring: Mirroring,
    pub prg_rom_banks: Banks,
}

impl Nrom {
    const PRG_RAM_SIZE: usize = 8 * 1024;
    const PRG_WINDOW: usize = 16 * 1024;

    pub fn load(cart: &mut Cart) -> Result<Mapper, cart::Error> {
        if !cart.has_chr_rom() {
            cart.add_chr_ram(8 * 1024);
        }
        cart.add_prg_ram(Self::PRG_RAM_SIZE);
        let nrom = Self {
            mirroring: cart.mirroring(),
            // 16K carts mirror the single bank into $C000-$FFFF
            prg_rom_banks: Banks::new(0x8000, 0xFFFF, cart.prg_rom.len(), Self::PRG_WINDOW)?,
        };
        Ok(nrom.into())
    }
}

impl MemMap for Nrom {
    // PPU $0000..=$1FFF 8K fixed CHR-ROM/CHR-RAM bank
    // CPU $6000..=$7FFF 8K PRG-RAM
    // CPU $8000..=$FFFF 16K/32K PRG-ROM, 16K mirrored

    fn map_peek(&self, addr: u16) -> MappedRead {
        match addr {
            0x0000..=0x1FFF => MappedRead::Chr(addr as usize),
            0x6000..=0x7FFF => MappedRead::PrgRam((addr & 0x1FFF) as usize),
            0x8000..=0xFFFF => MappedRead::PrgRom(self.prg_rom_banks.translate(addr)),
            _ => MappedRead::Bus,
        }
    }

    fn map_write(&mut self, addr: u16, val: u8) -> MappedWrite {
        match addr {
            0x0000..=0x1FFF => MappedWrite::ChrRam(addr as usize, val),
            0x6000..=0x7FFF => MappedWrite::PrgRam((addr & 0x1FFF) as usize, val),
            _ => MappedWrite::Bus,
        }
    }
}

impl Mapped for Nrom {
    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.mirroring = mirroring;
    }
}

impl Regional for Nrom {}
impl Reset for Nrom {}
