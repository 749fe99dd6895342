//! PPU address-space bus: pattern tables, nametables and palette RAM.
//!
//! <https://www.nesdev.org/wiki/PPU_memory_map>

use crate::{
    common::{Reset, ResetKind},
    mapper::{Mapped, MappedRead, MappedWrite, Mapper, MemMap},
};
use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum Mirroring {
    #[default]
    Horizontal,
    Vertical,
    SingleScreenA,
    SingleScreenB,
    FourScreen,
}

/// PPU-side memory bus.
///
/// The mapper claims the pattern-table range; nametable routing is derived
/// from the mapper's mirroring (set by the cartridge at load and possibly
/// banked at runtime); palette RAM is internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct PpuBus {
    pub mapper: Mapper,
    pub ciram: Vec<u8>, // 4K to support four-screen carts; 2K used otherwise
    pub palette: [u8; Self::PALETTE_SIZE],
    #[serde(skip)]
    pub chr_rom: Vec<u8>,
    pub chr_ram: Vec<u8>,
    pub open_bus: u8,
}

impl PpuBus {
    const CIRAM_SIZE: usize = 0x1000;
    const PALETTE_SIZE: usize = 32;

    pub fn new() -> Self {
        Self {
            mapper: Mapper::none(),
            ciram: vec![0x00; Self::CIRAM_SIZE],
            palette: [0x0F; Self::PALETTE_SIZE],
            chr_rom: vec![],
            chr_ram: vec![],
            open_bus: 0x00,
        }
    }

    /// Route a nametable address through the current mirroring.
    fn ciram_offset(&self, addr: u16) -> usize {
        let addr = (addr as usize) & 0x0FFF;
        let table = addr >> 10;
        let offset = addr & 0x03FF;
        let table = match self.mapper.mirroring() {
            Mirroring::Horizontal => (table >> 1) & 0x01,
            Mirroring::Vertical => table & 0x01,
            Mirroring::SingleScreenA => 0,
            Mirroring::SingleScreenB => 1,
            Mirroring::FourScreen => table,
        };
        (table << 10) | offset
    }

    const fn palette_offset(addr: u16) -> usize {
        let addr = (addr as usize) & 0x1F;
        // $3F10/$3F14/$3F18/$3F1C mirror $3F00/$3F04/$3F08/$3F0C
        if addr >= 0x10 && addr & 0x03 == 0 {
            addr & 0x0F
        } else {
            addr
        }
    }

    fn chr(&self, idx: usize) -> u8 {
        if self.chr_rom.is_empty() {
            self.chr_ram.get(idx).copied().unwrap_or(0x00)
        } else {
            self.chr_rom.get(idx).copied().unwrap_or(0x00)
        }
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        let val = match addr {
            0x0000..=0x1FFF => match self.mapper.map_read(addr) {
                MappedRead::Chr(idx) => self.chr(idx),
                MappedRead::Data(val) => val,
                _ => self.open_bus,
            },
            0x2000..=0x3EFF => self.ciram[self.ciram_offset(addr)],
            _ => self.palette[Self::palette_offset(addr)],
        };
        self.open_bus = val;
        val
    }

    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => match self.mapper.map_peek(addr) {
                MappedRead::Chr(idx) => self.chr(idx),
                MappedRead::Data(val) => val,
                _ => self.open_bus,
            },
            0x2000..=0x3EFF => self.ciram[self.ciram_offset(addr)],
            _ => self.palette[Self::palette_offset(addr)],
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => {
                if let MappedWrite::ChrRam(idx, val) = self.mapper.map_write(addr, val) {
                    if self.chr_rom.is_empty() {
                        if let Some(chr) = self.chr_ram.get_mut(idx) {
                            *chr = val;
                        }
                    }
                }
            }
            0x2000..=0x3EFF => {
                let offset = self.ciram_offset(addr);
                self.ciram[offset] = val;
            }
            _ => self.palette[Self::palette_offset(addr)] = val,
        }
        self.open_bus = val;
    }

    pub fn load_chr(&mut self, chr_rom: Vec<u8>, chr_ram: Vec<u8>) {
        self.chr_rom = chr_rom;
        self.chr_ram = chr_ram;
    }

    pub fn load_mapper(&mut self, mapper: Mapper) {
        self.mapper = mapper;
    }
}

impl Default for PpuBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Reset for PpuBus {
    fn reset(&mut self, kind: ResetKind) {
        if kind == ResetKind::Hard {
            self.ciram.fill(0x00);
            self.palette = [0x0F; Self::PALETTE_SIZE];
        }
        self.open_bus = 0x00;
        self.mapper.reset(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cart::Cart, mapper::Nrom};

    fn bus_with_mirroring(mirroring: Mirroring) -> PpuBus {
        let mut bus = PpuBus::new();
        bus.mapper = Nrom::load(&mut Cart::empty()).expect("valid mapper");
        bus.mapper.set_mirroring(mirroring);
        bus
    }

    #[test]
    fn palette_mirrors() {
        let mut bus = PpuBus::new();
        bus.write(0x3F10, 0x21);
        assert_eq!(bus.read(0x3F00), 0x21, "$3F10 mirrors $3F00");
        bus.write(0x3F04, 0x11);
        assert_eq!(bus.read(0x3F14), 0x11, "$3F14 mirrors $3F04");
    }

    #[test]
    fn vertical_mirroring_routes_tables() {
        let mut bus = bus_with_mirroring(Mirroring::Vertical);
        bus.write(0x2000, 0xAA);
        assert_eq!(bus.read(0x2800), 0xAA, "$2800 mirrors $2000 vertically");
        bus.write(0x2400, 0xBB);
        assert_eq!(bus.read(0x2C00), 0xBB, "$2C00 mirrors $2400 vertically");
    }

    #[test]
    fn horizontal_mirroring_routes_tables() {
        let mut bus = bus_with_mirroring(Mirroring::Horizontal);
        bus.write(0x2000, 0xCC);
        assert_eq!(bus.read(0x2400), 0xCC, "$2400 mirrors $2000 horizontally");
        bus.write(0x2800, 0xDD);
        assert_eq!(bus.read(0x2C00), 0xDD, "$2C00 mirrors $2800 horizontally");
    }
}
