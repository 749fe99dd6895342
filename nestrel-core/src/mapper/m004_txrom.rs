//! `TxROM`/`MMC3` (Mapper 004).
//!
//! <https://wiki.nesdev.com/w/index.php/TxROM>
//! <https://wiki.nesdev.com/w/index.php/MMC3>

use crate::{
    cart::{self, Cart},
    common::{Regional, Reset, ResetKind},
    mapper::{Mapped, MappedRead, MappedWrite, Mapper, MemMap},
    mem::Banks,
    ppu::Mirroring,
};
use serde::{Deserialize, Serialize};

/// `TxROM` registers.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Regs {
    pub bank_select: u8,
    pub bank_values: [u8; 8],
    pub irq_latch: u8,
    pub irq_counter: u8,
    pub irq_enabled: bool,
    pub irq_reload: bool,
    pub irq_pending: bool,
}

/// `TxROM`/`MMC3` (Mapper 004).
///
/// The IRQ counter is clocked once per scanline through the scanline-counter
/// capability instead of by raw PPU A12 edges; the observable edge is provided
/// by the PPU and routed here by the clock loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Txrom {
    pub regs: Regs,
    pub mirroring: Mirroring,
    pub chr_banks: Banks,
    pub prg_ram_banks: Banks,
    pub prg_rom_banks: Banks,
}

impl Txrom {
    const PRG_WINDOW: usize = 8 * 1024;
    const CHR_WINDOW: usize = 1024;
    const PRG_RAM_SIZE: usize = 8 * 1024;
    const CHR_RAM_SIZE: usize = 8 * 1024;

    const PRG_MODE_MASK: u8 = 0x40; // Bit 6 of bank select
    const CHR_INVERSION_MASK: u8 = 0x80; // Bit 7 of bank select

    pub fn load(cart: &mut Cart) -> Result<Mapper, cart::Error> {
        cart.add_prg_ram(Self::PRG_RAM_SIZE);
        let chr_len = if cart.has_chr_rom() {
            cart.chr_rom.len()
        } else {
            cart.add_chr_ram(Self::CHR_RAM_SIZE);
            cart.chr_ram.len()
        };
        let mut txrom = Self {
            regs: Regs::default(),
            mirroring: cart.mirroring(),
            chr_banks: Banks::new(0x0000, 0x1FFF, chr_len, Self::CHR_WINDOW)?,
            prg_ram_banks: Banks::new(0x6000, 0x7FFF, cart.prg_ram.len(), Self::PRG_WINDOW)?,
            prg_rom_banks: Banks::new(0x8000, 0xFFFF, cart.prg_rom.len(), Self::PRG_WINDOW)?,
        };
        let last_bank = txrom.prg_rom_banks.last();
        txrom.prg_rom_banks.set(2, last_bank - 1);
        txrom.prg_rom_banks.set(3, last_bank);
        Ok(txrom.into())
    }

    fn update_prg_banks(&mut self) {
        let prg_last = self.prg_rom_banks.last();
        let prg_lo = self.regs.bank_values[6] as usize;
        let prg_hi = self.regs.bank_values[7] as usize;
        if self.regs.bank_select & Self::PRG_MODE_MASK == Self::PRG_MODE_MASK {
            self.prg_rom_banks.set(0, prg_last - 1);
            self.prg_rom_banks.set(1, prg_hi);
            self.prg_rom_banks.set(2, prg_lo);
        } else {
            self.prg_rom_banks.set(0, prg_lo);
            self.prg_rom_banks.set(1, prg_hi);
            self.prg_rom_banks.set(2, prg_last - 1);
        }
        self.prg_rom_banks.set(3, prg_last);
    }

    fn update_chr_banks(&mut self) {
        // 1: two 2K banks at $1000-$1FFF, four 1K banks at $0000-$0FFF
        // 0: two 2K banks at $0000-$0FFF, four 1K banks at $1000-$1FFF
        let chr = self.regs.bank_values;
        if self.regs.bank_select & Self::CHR_INVERSION_MASK == Self::CHR_INVERSION_MASK {
            self.chr_banks.set(0, chr[2] as usize);
            self.chr_banks.set(1, chr[3] as usize);
            self.chr_banks.set(2, chr[4] as usize);
            self.chr_banks.set(3, chr[5] as usize);
            self.chr_banks.set_range(4, 5, (chr[0] & 0xFE) as usize);
            self.chr_banks.set_range(6, 7, (chr[1] & 0xFE) as usize);
        } else {
            self.chr_banks.set_range(0, 1, (chr[0] & 0xFE) as usize);
            self.chr_banks.set_range(2, 3, (chr[1] & 0xFE) as usize);
            self.chr_banks.set(4, chr[2] as usize);
            self.chr_banks.set(5, chr[3] as usize);
            self.chr_banks.set(6, chr[4] as usize);
            self.chr_banks.set(7, chr[5] as usize);
        }
    }

    fn update_banks(&mut self) {
        self.update_prg_banks();
        self.update_chr_banks();
    }
}

impl MemMap for Txrom {
    // PPU $0000..=$1FFF 2K/1K switchable CHR-ROM/RAM banks
    // CPU $6000..=$7FFF 8K PRG-RAM bank
    // CPU $8000..=$9FFF (or $C000..=$DFFF) 8K switchable PRG-ROM bank
    // CPU $A000..=$BFFF 8K switchable PRG-ROM bank
    // CPU $C000..=$DFFF (or $8000..=$9FFF) 8K PRG-ROM bank fixed to second-to-last
    // CPU $E000..=$FFFF 8K PRG-ROM bank fixed to last

    fn map_peek(&self, addr: u16) -> MappedRead {
        match addr {
            0x0000..=0x1FFF => MappedRead::Chr(self.chr_banks.translate(addr)),
            0x6000..=0x7FFF => MappedRead::PrgRam(self.prg_ram_banks.translate(addr)),
            0x8000..=0xFFFF => MappedRead::PrgRom(self.prg_rom_banks.translate(addr)),
            _ => MappedRead::Bus,
        }
    }

    fn map_write(&mut self, addr: u16, val: u8) -> MappedWrite {
        match addr {
            0x0000..=0x1FFF => MappedWrite::ChrRam(self.chr_banks.translate(addr), val),
            0x6000..=0x7FFF => MappedWrite::PrgRam(self.prg_ram_banks.translate(addr), val),
            0x8000..=0xFFFF => {
                // Registers respond to even/odd addresses within each 8K range
                match addr & 0xE001 {
                    0x8000 => {
                        self.regs.bank_select = val;
                        self.update_banks();
                    }
                    0x8001 => {
                        let bank = self.regs.bank_select & 0x07;
                        self.regs.bank_values[bank as usize] = val;
                        self.update_banks();
                    }
                    0xA000 => {
                        if self.mirroring != Mirroring::FourScreen {
                            self.set_mirroring(if val & 0x01 == 0x01 {
                                Mirroring::Horizontal
                            } else {
                                Mirroring::Vertical
                            });
                        }
                    }
                    0xA001 => (), // PRG-RAM protect, left writable
                    0xC000 => self.regs.irq_latch = val,
                    0xC001 => self.regs.irq_reload = true,
                    0xE000 => {
                        self.regs.irq_enabled = false;
                        self.regs.irq_pending = false;
                    }
                    0xE001 => self.regs.irq_enabled = true,
                    _ => unreachable!("impossible address"),
                }
                MappedWrite::Bus
            }
            _ => MappedWrite::Bus,
        }
    }
}

impl Mapped for Txrom {
    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.mirroring = mirroring;
    }

    fn irq_pending(&self) -> bool {
        self.regs.irq_pending
    }

    fn has_scanline_counter(&self) -> bool {
        true
    }

    fn scanline_tick(&mut self) {
        if self.regs.irq_counter == 0 || self.regs.irq_reload {
            self.regs.irq_counter = self.regs.irq_latch;
            self.regs.irq_reload = false;
        } else {
            self.regs.irq_counter -= 1;
        }
        if self.regs.irq_counter == 0 && self.regs.irq_enabled {
            self.regs.irq_pending = true;
        }
    }
}

impl Regional for Txrom {}

impl Reset for Txrom {
    fn reset(&mut self, _kind: ResetKind) {
        self.regs = Regs::default();
        self.update_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mapper::{Mapped, MemMap},
        mem::RamState,
    };

    fn mmc3_cart() -> Cart {
        let mut rom = vec![
            0x4E, 0x45, 0x53, 0x1A, // NES\x1a
            0x02, 0x01, // 32K PRG, 8K CHR
            0x40, 0x00, // mapper 4
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        rom.extend(vec![0x00; 2 * 0x4000 + 0x2000]);
        Cart::from_rom("mmc3_test", &mut rom.as_slice(), RamState::AllZeros).expect("valid cart")
    }

    #[test]
    fn scanline_counter_capability() {
        let cart = mmc3_cart();
        assert!(cart.mapper.has_scanline_counter(), "mmc3 counts scanlines");
        assert!(!Mapper::none().has_scanline_counter(), "empty does not");
    }

    #[test]
    fn irq_after_latch_expires() {
        let mut cart = mmc3_cart();
        // latch = 3, reload, enable
        cart.mapper.map_write(0xC000, 0x03);
        cart.mapper.map_write(0xC001, 0x00);
        cart.mapper.map_write(0xE001, 0x00);

        // reload tick loads the latch; counter reaches zero 3 ticks later
        for tick in 0..3 {
            cart.mapper.scanline_tick();
            assert!(!cart.mapper.irq_pending(), "no irq on tick {tick}");
        }
        cart.mapper.scanline_tick();
        assert!(cart.mapper.irq_pending(), "irq after counter expires");
    }

    #[test]
    fn irq_acknowledge_and_disable() {
        let mut cart = mmc3_cart();
        cart.mapper.map_write(0xC000, 0x00);
        cart.mapper.map_write(0xC001, 0x00);
        cart.mapper.map_write(0xE001, 0x00);
        cart.mapper.scanline_tick();
        assert!(cart.mapper.irq_pending(), "latch 0 fires every tick");

        cart.mapper.map_write(0xE000, 0x00);
        assert!(!cart.mapper.irq_pending(), "write $E000 acknowledges irq");
    }

    #[test]
    fn one_tick_per_scanline_sequence() {
        let mut cart = mmc3_cart();
        cart.mapper.map_write(0xC000, 0x08);
        cart.mapper.map_write(0xC001, 0x00);
        cart.mapper.map_write(0xE001, 0x00);
        // 1 reload tick + 8 decrements
        let mut fired_at = None;
        for scanline in 0..16 {
            cart.mapper.scanline_tick();
            if cart.mapper.irq_pending() && fired_at.is_none() {
                fired_at = Some(scanline);
            }
        }
        assert_eq!(fired_at, Some(8), "irq fires exactly 8 scanlines after reload");
    }
}
