//! NES cartridge implementation.

use crate::{
    common::NesRegion,
    mapper::{Cnrom, Mapper, Nrom, Txrom, Uxrom},
    mem::RamState,
    ppu::Mirroring,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use thiserror::Error;
use tracing::{debug, info};

const PRG_ROM_BANK_SIZE: usize = 0x4000;
const CHR_ROM_BANK_SIZE: usize = 0x2000;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[must_use]
pub enum Error {
    #[error("invalid nes header (found: ${value:02X} at byte: {byte}). {message}")]
    InvalidHeader {
        byte: u8,
        value: u8,
        message: String,
    },
    #[error("unimplemented mapper `{0}`")]
    UnimplementedMapper(u16),
    #[error(transparent)]
    Banks(#[from] crate::mem::Error),
    #[error("{context}: {source:?}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum NesVariant {
    #[default]
    ArchaicINes,
    INes,
    Nes2,
}

/// An iNES/NES 2.0 format header.
///
/// <https://www.nesdev.org/wiki/INES>
#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct NesHeader {
    pub variant: NesVariant,
    pub mapper_num: u16,
    pub submapper_num: u8,
    pub flags: u8, // Mirroring, Battery, Trainer, VS Unisystem, Playchoice-10, NES 2.0
    pub prg_rom_banks: u16,
    pub chr_rom_banks: u16,
    pub tv_mode: u8,
}

impl NesHeader {
    /// Parse the 16-byte header from the start of a ROM stream.
    ///
    /// # Errors
    ///
    /// If the header magic or sizes are invalid, then an error is returned.
    pub fn load(rom_data: &mut impl Read) -> Result<Self> {
        let mut header = [0u8; 16];
        rom_data
            .read_exact(&mut header)
            .map_err(|err| Error::io(err, "failed to read nes header"))?;

        if header[0..4] != *b"NES\x1a" {
            return Err(Error::InvalidHeader {
                byte: 0,
                value: header[0],
                message: "nes header signature not found".to_string(),
            });
        }

        let variant = if header[7] & 0x0C == 0x08 {
            NesVariant::Nes2
        } else if header[7] & 0x0C == 0x04 {
            NesVariant::ArchaicINes
        } else {
            NesVariant::INes
        };

        let mut mapper_num = u16::from((header[6] >> 4) | (header[7] & 0xF0));
        let mut submapper_num = 0;
        let mut prg_rom_banks = u16::from(header[4]);
        let mut chr_rom_banks = u16::from(header[5]);
        let mut tv_mode = 0;
        if variant == NesVariant::Nes2 {
            mapper_num |= u16::from(header[8] & 0x0F) << 8;
            submapper_num = header[8] >> 4;
            prg_rom_banks |= u16::from(header[9] & 0x0F) << 8;
            chr_rom_banks |= u16::from(header[9] & 0xF0) << 4;
            tv_mode = header[12] & 0x03;
        } else if variant == NesVariant::INes {
            tv_mode = header[9] & 0x01;
        }

        Ok(Self {
            variant,
            mapper_num,
            submapper_num,
            flags: header[6] & 0x0F,
            prg_rom_banks,
            chr_rom_banks,
            tv_mode,
        })
    }
}

/// An NES cartridge.
#[derive(Default)]
#[must_use]
pub struct Cart {
    name: String,
    header: NesHeader,
    region: NesRegion,
    ram_state: RamState,
    pub(crate) mapper: Mapper,
    pub(crate) chr_rom: Vec<u8>,
    pub(crate) chr_ram: Vec<u8>,
    pub(crate) prg_rom: Vec<u8>,
    pub(crate) prg_ram: Vec<u8>,
}

impl Cart {
    pub fn empty() -> Self {
        let mut empty = Self {
            name: "Empty Cart".to_string(),
            header: NesHeader {
                prg_rom_banks: 1,
                chr_rom_banks: 1,
                ..NesHeader::default()
            },
            region: NesRegion::Ntsc,
            ram_state: RamState::default(),
            mapper: Mapper::none(),
            chr_rom: vec![0x00; CHR_ROM_BANK_SIZE],
            chr_ram: vec![],
            prg_rom: vec![0x00; PRG_ROM_BANK_SIZE],
            prg_ram: vec![],
        };
        empty.mapper = Nrom::load(&mut empty).expect("valid empty mapper");
        empty
    }

    /// Load `Cart` from a ROM path.
    ///
    /// # Errors
    ///
    /// If the NES header is corrupted, the ROM file cannot be read, or the data does not match
    /// the header, then an error is returned.
    pub fn from_path<P: AsRef<Path>>(path: P, ram_state: RamState) -> Result<Self> {
        let path = path.as_ref();
        let mut rom = BufReader::new(
            File::open(path)
                .map_err(|err| Error::io(err, format!("failed to open rom {path:?}")))?,
        );
        Self::from_rom(crate::fs::filename(path), &mut rom, ram_state)
    }

    /// Load `Cart` from ROM data.
    ///
    /// # Errors
    ///
    /// If the NES header is invalid, or the ROM data does not match the header, then an error is
    /// returned.
    pub fn from_rom<S, F>(name: S, rom_data: &mut F, ram_state: RamState) -> Result<Self>
    where
        S: ToString,
        F: Read,
    {
        let name = name.to_string();
        let header = NesHeader::load(rom_data)?;

        // Trainer data, rarely present, precedes PRG-ROM
        if header.flags & 0x04 == 0x04 {
            let mut trainer = [0u8; 512];
            rom_data
                .read_exact(&mut trainer)
                .map_err(|err| Error::io(err, "failed to read trainer"))?;
        }

        let prg_rom_len = (header.prg_rom_banks as usize) * PRG_ROM_BANK_SIZE;
        let mut prg_rom = vec![0x00; prg_rom_len];
        rom_data.read_exact(&mut prg_rom).map_err(|err| {
            if let std::io::ErrorKind::UnexpectedEof = err.kind() {
                Error::InvalidHeader {
                    byte: 4,
                    value: header.prg_rom_banks as u8,
                    message: format!(
                        "expected `{}` prg-rom banks ({prg_rom_len} total bytes)",
                        header.prg_rom_banks
                    ),
                }
            } else {
                Error::io(err, "failed to read prg-rom")
            }
        })?;

        let mut chr_rom = vec![0x00; (header.chr_rom_banks as usize) * CHR_ROM_BANK_SIZE];
        let mut chr_ram = vec![];
        if header.chr_rom_banks > 0 {
            rom_data.read_exact(&mut chr_rom).map_err(|err| {
                if let std::io::ErrorKind::UnexpectedEof = err.kind() {
                    Error::InvalidHeader {
                        byte: 5,
                        value: header.chr_rom_banks as u8,
                        message: format!("expected `{}` chr-rom banks", header.chr_rom_banks),
                    }
                } else {
                    Error::io(err, "failed to read chr-rom")
                }
            })?;
        } else {
            chr_ram = vec![0x00; CHR_ROM_BANK_SIZE];
            RamState::fill(&mut chr_ram, ram_state);
        }

        let region = match header.tv_mode {
            1 | 3 => NesRegion::Pal,
            _ if name.contains("(E)") || name.contains("(Europe)") || name.contains("(PAL)") => {
                NesRegion::Pal
            }
            _ => NesRegion::Ntsc,
        };

        let mut cart = Self {
            name,
            header,
            region,
            ram_state,
            mapper: Mapper::none(),
            chr_rom,
            chr_ram,
            prg_rom,
            prg_ram: vec![],
        };
        cart.mapper = match cart.header.mapper_num {
            0 => Nrom::load(&mut cart)?,
            2 => Uxrom::load(&mut cart)?,
            3 => Cnrom::load(&mut cart)?,
            4 => Txrom::load(&mut cart)?,
            _ => return Err(Error::UnimplementedMapper(cart.header.mapper_num)),
        };

        info!("loaded ROM `{cart}`");
        debug!("{cart:?}");
        Ok(cart)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn region(&self) -> NesRegion {
        self.region
    }

    pub const fn ram_state(&self) -> RamState {
        self.ram_state
    }

    #[must_use]
    pub fn has_chr_rom(&self) -> bool {
        !self.chr_rom.is_empty()
    }

    /// Returns whether this cartridge has battery-backed Save RAM.
    #[must_use]
    pub const fn battery_backed(&self) -> bool {
        self.header.flags & 0x02 == 0x02
    }

    /// Returns hardware configured `Mirroring`.
    pub const fn mirroring(&self) -> Mirroring {
        if self.header.flags & 0x08 == 0x08 {
            Mirroring::FourScreen
        } else if self.header.flags & 0x01 == 0x01 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }

    /// Returns the Mapper number for this Cart.
    #[must_use]
    pub const fn mapper_num(&self) -> u16 {
        self.header.mapper_num
    }

    /// Allows mappers to add PRG-RAM.
    pub(crate) fn add_prg_ram(&mut self, capacity: usize) {
        self.prg_ram.resize(capacity, 0x00);
        RamState::fill(&mut self.prg_ram, self.ram_state);
    }

    /// Allows mappers to add CHR-RAM.
    pub(crate) fn add_chr_ram(&mut self, capacity: usize) {
        if self.chr_ram.len() < capacity {
            self.chr_ram.resize(capacity, 0x00);
            RamState::fill(&mut self.chr_ram, self.ram_state);
        }
    }
}

impl std::fmt::Display for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, Mapper {}, {}K PRG-ROM, {}K CHR, {}, Battery: {}",
            self.name,
            self.mapper_num(),
            self.prg_rom.len() / 0x0400,
            (self.chr_rom.len() + self.chr_ram.len()) / 0x0400,
            self.region,
            self.battery_backed(),
        )
    }
}

impl std::fmt::Debug for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("region", &self.region)
            .field("ram_state", &self.ram_state)
            .field("mirroring", &self.mirroring())
            .field("battery_backed", &self.battery_backed())
            .field("prg_rom_len", &self.prg_rom.len())
            .field("prg_ram_len", &self.prg_ram.len())
            .field("chr_rom_len", &self.chr_rom.len())
            .field("chr_ram_len", &self.chr_ram.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(mapper: u8, flags: u8) -> Vec<u8> {
        let mut rom = vec![
            0x4E, 0x45, 0x53, 0x1A, // NES\x1a
            0x01, 0x01, // 16K PRG, 8K CHR
            (mapper << 4) | flags,
            0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        rom.extend(vec![0x00; PRG_ROM_BANK_SIZE + CHR_ROM_BANK_SIZE]);
        rom
    }

    #[test]
    fn parse_ines_header() {
        let rom = header(0, 0x00);
        let cart =
            Cart::from_rom("parse_test", &mut rom.as_slice(), RamState::AllZeros).expect("cart");
        assert_eq!(cart.mapper_num(), 0, "mapper number");
        assert_eq!(cart.mirroring(), Mirroring::Horizontal, "mirroring");
        assert!(!cart.battery_backed(), "no battery");
        assert_eq!(cart.prg_rom.len(), PRG_ROM_BANK_SIZE, "prg rom size");
        assert_eq!(cart.chr_rom.len(), CHR_ROM_BANK_SIZE, "chr rom size");
    }

    #[test]
    fn battery_and_mirroring_flags() {
        let rom = header(0, 0x03);
        let cart =
            Cart::from_rom("flags_test", &mut rom.as_slice(), RamState::AllZeros).expect("cart");
        assert!(cart.battery_backed(), "battery flag");
        assert_eq!(cart.mirroring(), Mirroring::Vertical, "vertical mirroring");
    }

    #[test]
    fn bad_magic_rejected() {
        let rom = vec![0xFF; 0x6010];
        let res = Cart::from_rom("bad_magic", &mut rom.as_slice(), RamState::AllZeros);
        assert!(matches!(res, Err(Error::InvalidHeader { .. })), "bad magic");
    }

    #[test]
    fn unimplemented_mapper_rejected() {
        let rom = header(5, 0x00);
        let res = Cart::from_rom("mmc5", &mut rom.as_slice(), RamState::AllZeros);
        assert!(
            matches!(res, Err(Error::UnimplementedMapper(5))),
            "mapper 5 unimplemented"
        );
    }

    #[test]
    fn pal_region_from_name() {
        let rom = header(0, 0x00);
        let cart = Cart::from_rom("Game (E)", &mut rom.as_slice(), RamState::AllZeros).unwrap();
        assert_eq!(cart.region(), NesRegion::Pal, "pal detected from name");
    }
}
