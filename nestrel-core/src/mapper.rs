//! Memory mappers for cartridges.
//!
//! <http://wiki.nesdev.com/w/index.php/Mapper>

use crate::{
    common::{NesRegion, Regional, Reset, ResetKind},
    ppu::Mirroring,
};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

pub use m000_nrom::Nrom;
pub use m002_uxrom::Uxrom;
pub use m003_cnrom::Cnrom;
pub use m004_txrom::Txrom;

pub mod m000_nrom;
pub mod m002_uxrom;
pub mod m003_cnrom;
pub mod m004_txrom;

#[enum_dispatch]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub enum Mapper {
    Empty,
    Nrom,
    Uxrom,
    Cnrom,
    Txrom,
}

impl Mapper {
    pub fn none() -> Self {
        Empty.into()
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum MappedRead {
    Bus,
    Chr(usize),
    PrgRom(usize),
    PrgRam(usize),
    Data(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum MappedWrite {
    None,
    Bus,
    ChrRam(usize, u8),
    PrgRam(usize, u8),
}

/// Address translation for the mapper's claimed ranges in either bus space.
#[enum_dispatch(Mapper)]
pub trait MemMap {
    fn map_read(&mut self, addr: u16) -> MappedRead {
        self.map_peek(addr)
    }

    fn map_peek(&self, _addr: u16) -> MappedRead {
        MappedRead::Bus
    }

    fn map_write(&mut self, _addr: u16, _val: u8) -> MappedWrite {
        MappedWrite::Bus
    }
}

/// Mapper-controlled wiring: nametable routing, interrupt line, and the
/// optional scanline-counter capability queried once when the cartridge is
/// wired up (no downcasts in the clock loop).
#[enum_dispatch(Mapper)]
pub trait Mapped {
    fn mirroring(&self) -> Mirroring {
        Mirroring::default()
    }
    fn set_mirroring(&mut self, _mirroring: Mirroring) {}
    /// Level-triggered IRQ line into the CPU.
    fn irq_pending(&self) -> bool {
        false
    }
    /// Whether this mapper counts scanlines to gate its IRQ.
    fn has_scanline_counter(&self) -> bool {
        false
    }
    /// Advance the scanline counter by one scanline edge.
    fn scanline_tick(&mut self) {}
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Empty;

impl MemMap for Empty {}
impl Mapped for Empty {}
impl Regional for Empty {}
impl Reset for Empty {}
