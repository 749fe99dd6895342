//! # nestrel-core
//!
//! The deterministic NES emulation engine behind `nestrel`: a cycle-ratio
//! clock loop interleaving a 6502 CPU (with the APU as a CPU-clocked
//! sub-device) and a pixel-stepped PPU, a memory-mapped bus binding
//! CPU/PPU/cartridge/controllers into one address space, and versioned save
//! states.

pub mod apu;
pub mod bus;
pub mod cart;
pub mod common;
pub mod control_deck;
pub mod cpu;
pub mod fs;
pub mod input;
pub mod mapper;
pub mod mem;
pub mod ppu;
pub mod video;

pub mod prelude {
    //! Re-exports of the common types used for basic NES emulation.

    pub use crate::{
        apu::Apu,
        cart::Cart,
        common::{Clock, NesRegion, Regional, Reset, ResetKind},
        control_deck::{Config, ControlDeck, StepMode, StepOutcome},
        cpu::Cpu,
        input::{Joypad, JoypadBtn, Player},
        mapper::{Mapped, MappedRead, MappedWrite, Mapper, MemMap},
        mem::RamState,
        ppu::{Mirroring, Ppu},
        video::Frame,
    };
}
