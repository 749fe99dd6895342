//! 6502 Central Processing Unit (CPU) implementation.
//!
//! <https://wiki.nesdev.org/w/index.php/CPU>
//!
//! Stepped one instruction at a time; [`Cpu::step`] returns the number of
//! cycles the instruction consumed, after clocking CPU-domain sub-devices
//! (APU) for exactly that many cycles.

use crate::{
    bus::Bus,
    common::{NesRegion, Regional, Reset, ResetKind},
    mapper::Mapped,
};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

pub mod instr;

// Status Registers
// https://wiki.nesdev.org/w/index.php/Status_flags
// 7654 3210
// NVUB DIZC
// |||| ||||
// |||| |||+- Carry
// |||| ||+-- Zero
// |||| |+--- Interrupt Disable
// |||| +---- Decimal Mode - Not used in the NES but still has to function
// |||+------ Break - 1 when pushed to stack from PHP/BRK, 0 from IRQ/NMI
// ||+------- Unused - always set to 1 when pushed to stack
// |+-------- Overflow
// +--------- Negative
bitflags! {
    /// CPU Status Registers.
    #[derive(Default, Serialize, Deserialize, Debug, Copy, Clone)]
    #[must_use]
    pub struct Status: u8 {
        const C = 1;
        const Z = 1 << 1;
        const I = 1 << 2;
        const D = 1 << 3;
        const B = 1 << 4;
        const U = 1 << 5;
        const V = 1 << 6;
        const N = 1 << 7;
    }
}

/// The Central Processing Unit status and registers.
#[derive(Clone, Serialize, Deserialize)]
#[must_use]
pub struct Cpu {
    /// Total number of cycles ran since reset.
    pub cycle: u64,
    /// Program counter.
    pub pc: u16,
    /// Stack pointer - stack is at $0100-$01FF.
    pub sp: u8,
    /// Accumulator register.
    pub acc: u8,
    /// X register.
    pub x: u8,
    /// Y register.
    pub y: u8,
    /// Status registers.
    pub status: Status,
    /// Data bus.
    pub bus: Bus,
    /// Encountering a jam opcode corrupts CPU processing.
    #[serde(skip)]
    pub corrupted: bool,
    /// Log each executed instruction.
    #[serde(skip)]
    pub trace_instrs: bool,
}

impl Cpu {
    const NMI_VECTOR: u16 = 0xFFFA;
    const RESET_VECTOR: u16 = 0xFFFC;
    const IRQ_VECTOR: u16 = 0xFFFE;
    const POWER_ON_STATUS: Status = Status::U.union(Status::I);
    const POWER_ON_SP: u8 = 0xFD;
    const SP_BASE: u16 = 0x0100;

    /// Create a new CPU with the given bus.
    pub fn new(bus: Bus) -> Self {
        Self {
            cycle: 0,
            pc: 0x0000,
            sp: 0x00,
            acc: 0x00,
            x: 0x00,
            y: 0x00,
            status: Self::POWER_ON_STATUS,
            bus,
            corrupted: false,
            trace_instrs: false,
        }
    }

    /// Execute exactly one instruction, servicing a pending NMI or IRQ first.
    ///
    /// Returns the number of CPU cycles consumed. The APU is clocked for the
    /// same number of cycles before returning.
    pub fn step(&mut self) -> u64 {
        let mut cycles = if self.bus.ppu.nmi_pending {
            self.bus.ppu.nmi_pending = false;
            self.interrupt(Self::NMI_VECTOR, false)
        } else if self.irq_line() && !self.status.contains(Status::I) {
            self.interrupt(Self::IRQ_VECTOR, false)
        } else {
            if self.trace_instrs {
                self.trace_instr();
            }
            let opcode = self.fetch_byte();
            self.execute(opcode)
        };
        cycles += self.handle_oam_dma();
        self.cycle += cycles;
        self.bus.tick(cycles);
        cycles
    }

    /// Level-triggered IRQ sources: APU frame counter, DMC, mapper.
    fn irq_line(&self) -> bool {
        self.bus.apu.irq_pending() || self.bus.ppu.bus.mapper.irq_pending()
    }

    /// Service an interrupt.
    ///
    /// <https://wiki.nesdev.org/w/index.php/IRQ>
    fn interrupt(&mut self, vector: u16, brk: bool) -> u64 {
        self.push_word(self.pc);
        let mut status = self.status | Status::U;
        status.set(Status::B, brk);
        self.push_byte(status.bits());
        self.status.insert(Status::I);
        self.pc = self.read_word(vector);
        trace!(
            "{} - PPU:{:3},{:3} CYC:{}",
            if vector == Self::NMI_VECTOR { "NMI" } else { "IRQ" },
            self.bus.ppu.cycle,
            self.bus.ppu.scanline,
            self.cycle
        );
        7
    }

    /// `BRK` shares the interrupt sequence with B set on the pushed status.
    pub(crate) fn brk(&mut self) -> u64 {
        self.pc = self.pc.wrapping_add(1); // Padding byte
        self.interrupt(Self::IRQ_VECTOR, true)
    }

    /// Perform a pending OAM DMA transfer.
    ///
    /// The CPU is halted for 513 cycles (+1 on odd cycles) while 256 bytes
    /// are copied to the PPU's OAM through `$2004`.
    fn handle_oam_dma(&mut self) -> u64 {
        match self.bus.oam_dma_page.take() {
            Some(page) => {
                let base = u16::from(page) << 8;
                for offset in 0..256 {
                    let val = self.bus.read(base + offset);
                    self.bus.write(0x2004, val);
                }
                513 + (self.cycle & 0x01)
            }
            None => 0,
        }
    }

    // Status register functions

    /// Set both [`Status::Z`] and [`Status::N`] flags based on value.
    #[inline]
    pub(crate) fn set_zn_status(&mut self, val: u8) {
        self.status.set(Status::Z, val == 0x00);
        self.status.set(Status::N, val & 0x80 == 0x80);
    }

    #[inline]
    pub(crate) fn set_acc(&mut self, val: u8) {
        self.set_zn_status(val);
        self.acc = val;
    }

    #[inline]
    pub(crate) fn set_x(&mut self, val: u8) {
        self.set_zn_status(val);
        self.x = val;
    }

    #[inline]
    pub(crate) fn set_y(&mut self, val: u8) {
        self.set_zn_status(val);
        self.y = val;
    }

    // Stack functions

    #[inline]
    pub(crate) fn push_byte(&mut self, val: u8) {
        self.bus.write(Self::SP_BASE | u16::from(self.sp), val);
        self.sp = self.sp.wrapping_sub(1);
    }

    #[inline]
    #[must_use]
    pub(crate) fn pop_byte(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.bus.read(Self::SP_BASE | u16::from(self.sp))
    }

    #[inline]
    pub(crate) fn push_word(&mut self, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.push_byte(hi);
        self.push_byte(lo);
    }

    #[inline]
    pub(crate) fn pop_word(&mut self) -> u16 {
        let lo = self.pop_byte();
        let hi = self.pop_byte();
        u16::from_le_bytes([lo, hi])
    }

    // Memory accesses

    /// Fetch a byte and increment PC by 1.
    #[inline]
    #[must_use]
    pub(crate) fn fetch_byte(&mut self) -> u8 {
        let val = self.bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    /// Fetch a 16-bit word and increment PC by 2.
    #[inline]
    #[must_use]
    pub(crate) fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte();
        let hi = self.fetch_byte();
        u16::from_le_bytes([lo, hi])
    }

    /// Read a 16-bit word.
    #[inline]
    #[must_use]
    pub(crate) fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.bus.read(addr);
        let hi = self.bus.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Read a 16-bit word from the zero page, wrapping at $FF.
    #[inline]
    #[must_use]
    pub(crate) fn read_word_zp(&mut self, addr: u8) -> u16 {
        let lo = self.bus.read(addr.into());
        let hi = self.bus.read(addr.wrapping_add(1).into());
        u16::from_le_bytes([lo, hi])
    }

    /// Returns whether two addresses are on different memory pages.
    #[inline]
    #[must_use]
    pub(crate) const fn pages_differ(addr1: u16, addr2: u16) -> bool {
        (addr1 & 0xFF00) != (addr2 & 0xFF00)
    }

    // Addressing modes

    #[inline]
    pub(crate) fn am_imm(&mut self) -> u16 {
        let addr = self.pc;
        self.pc = self.pc.wrapping_add(1);
        addr
    }

    #[inline]
    pub(crate) fn am_zp(&mut self) -> u16 {
        self.fetch_byte().into()
    }

    #[inline]
    pub(crate) fn am_zpx(&mut self) -> u16 {
        self.fetch_byte().wrapping_add(self.x).into()
    }

    #[inline]
    pub(crate) fn am_zpy(&mut self) -> u16 {
        self.fetch_byte().wrapping_add(self.y).into()
    }

    #[inline]
    pub(crate) fn am_abs(&mut self) -> u16 {
        self.fetch_word()
    }

    #[inline]
    pub(crate) fn am_abx(&mut self) -> (u16, bool) {
        let base = self.fetch_word();
        let addr = base.wrapping_add(self.x.into());
        (addr, Self::pages_differ(base, addr))
    }

    #[inline]
    pub(crate) fn am_aby(&mut self) -> (u16, bool) {
        let base = self.fetch_word();
        let addr = base.wrapping_add(self.y.into());
        (addr, Self::pages_differ(base, addr))
    }

    #[inline]
    pub(crate) fn am_idx(&mut self) -> u16 {
        let zp = self.fetch_byte().wrapping_add(self.x);
        self.read_word_zp(zp)
    }

    #[inline]
    pub(crate) fn am_idy(&mut self) -> (u16, bool) {
        let zp = self.fetch_byte();
        let base = self.read_word_zp(zp);
        let addr = base.wrapping_add(self.y.into());
        (addr, Self::pages_differ(base, addr))
    }

    /// Branch on `cond`; returns total instruction cycles.
    pub(crate) fn branch(&mut self, cond: bool) -> u64 {
        let offset = self.fetch_byte() as i8;
        if cond {
            let old_pc = self.pc;
            self.pc = old_pc.wrapping_add(offset as u16);
            3 + u64::from(Self::pages_differ(old_pc, self.pc))
        } else {
            2
        }
    }

    /// Logs the instruction about to be executed.
    fn trace_instr(&mut self) {
        let opcode = self.bus.peek(self.pc);
        trace!(
            "${:04X} ${:02X} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} PPU:{:3},{:3} CYC:{}",
            self.pc,
            opcode,
            self.acc,
            self.x,
            self.y,
            self.status.bits(),
            self.sp,
            self.bus.ppu.cycle,
            self.bus.ppu.scanline,
            self.cycle
        );
    }
}

impl Regional for Cpu {
    fn region(&self) -> NesRegion {
        self.bus.region
    }

    fn set_region(&mut self, region: NesRegion) {
        self.bus.set_region(region);
    }
}

impl Reset for Cpu {
    /// Resets the CPU.
    ///
    /// Reads the reset vector into PC and burns the 7 power-on cycles.
    fn reset(&mut self, kind: ResetKind) {
        trace!("{kind:?} RESET");

        match kind {
            ResetKind::Soft => {
                self.status.insert(Status::I);
                // Reset runs the IRQ sequence with writes suppressed, leaving
                // only the SP decrement observable
                self.sp = self.sp.wrapping_sub(0x03);
            }
            ResetKind::Hard => {
                self.acc = 0x00;
                self.x = 0x00;
                self.y = 0x00;
                self.status = Self::POWER_ON_STATUS;
                self.sp = Self::POWER_ON_SP;
            }
        }
        self.corrupted = false;
        self.bus.reset(kind);

        let lo = self.bus.read(Self::RESET_VECTOR);
        let hi = self.bus.read(Self::RESET_VECTOR + 1);
        self.pc = u16::from_le_bytes([lo, hi]);

        // The CPU takes 7 cycles to reset/power on
        // See: <https://www.nesdev.org/wiki/CPU_interrupts>
        self.cycle = 7;
        self.bus.tick(7);
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("cycle", &self.cycle)
            .field("pc", &format_args!("${:04X}", self.pc))
            .field("sp", &format_args!("${:02X}", self.sp))
            .field("acc", &format_args!("${:02X}", self.acc))
            .field("x", &format_args!("${:02X}", self.x))
            .field("y", &format_args!("${:02X}", self.y))
            .field("status", &self.status)
            .field("corrupted", &self.corrupted)
            .field("bus", &self.bus)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::Cart;

    fn cpu_with_prg(prg: &[u8]) -> Cpu {
        let mut cart = Cart::empty();
        cart.prg_rom[..prg.len()].copy_from_slice(prg);
        // Reset vector -> $8000
        cart.prg_rom[0x3FFC] = 0x00;
        cart.prg_rom[0x3FFD] = 0x80;
        let mut cpu = Cpu::new(Bus::default());
        cpu.bus.load_cart(cart);
        cpu.reset(ResetKind::Hard);
        cpu
    }

    #[test]
    fn reset_reads_vector() {
        let cpu = cpu_with_prg(&[0xEA]);
        assert_eq!(cpu.pc, 0x8000, "pc from reset vector");
        assert_eq!(cpu.sp, Cpu::POWER_ON_SP, "power-on sp");
        assert_eq!(cpu.cycle, 7, "power-on cycles");
    }

    #[test]
    fn nop_takes_two_cycles() {
        let mut cpu = cpu_with_prg(&[0xEA]);
        let cycles = cpu.step();
        assert_eq!(cycles, 2, "nop cycles");
        assert_eq!(cpu.pc, 0x8001, "pc advanced");
    }

    #[test]
    fn lda_imm_sets_flags() {
        let mut cpu = cpu_with_prg(&[0xA9, 0x00, 0xA9, 0x80]);
        cpu.step();
        assert!(cpu.status.contains(Status::Z), "zero flag");
        cpu.step();
        assert!(cpu.status.contains(Status::N), "negative flag");
        assert_eq!(cpu.acc, 0x80, "accumulator loaded");
    }

    #[test]
    fn sta_abs_writes_memory() {
        // LDA #$42; STA $0200
        let mut cpu = cpu_with_prg(&[0xA9, 0x42, 0x8D, 0x00, 0x02]);
        cpu.step();
        let cycles = cpu.step();
        assert_eq!(cycles, 4, "sta abs cycles");
        assert_eq!(cpu.bus.peek(0x0200), 0x42, "memory written");
    }

    #[test]
    fn adc_overflow_and_carry() {
        // LDA #$7F; ADC #$01 -> $80, V set, C clear
        let mut cpu = cpu_with_prg(&[0xA9, 0x7F, 0x69, 0x01]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.acc, 0x80, "sum");
        assert!(cpu.status.contains(Status::V), "signed overflow");
        assert!(!cpu.status.contains(Status::C), "no carry");
        assert!(cpu.status.contains(Status::N), "negative");
    }

    #[test]
    fn branch_taken_costs_extra_cycle() {
        // SEC; BCS +2
        let mut cpu = cpu_with_prg(&[0x38, 0xB0, 0x02]);
        cpu.step();
        let cycles = cpu.step();
        assert_eq!(cycles, 3, "taken branch without page cross");
        assert_eq!(cpu.pc, 0x8005, "branch target");
    }

    #[test]
    fn page_cross_adds_cycle() {
        // LDX #$01; LDA $80FF,X crosses into $8100
        let mut cpu = cpu_with_prg(&[0xA2, 0x01, 0xBD, 0xFF, 0x80]);
        cpu.step();
        let cycles = cpu.step();
        assert_eq!(cycles, 5, "lda abx with page cross");
    }

    #[test]
    fn jsr_rts_round_trip() {
        // JSR $8004; NOP; (at $8004) RTS
        let mut cpu = cpu_with_prg(&[0x20, 0x04, 0x80, 0xEA, 0x60]);
        let cycles = cpu.step();
        assert_eq!(cycles, 6, "jsr cycles");
        assert_eq!(cpu.pc, 0x8004, "jsr target");
        let cycles = cpu.step();
        assert_eq!(cycles, 6, "rts cycles");
        assert_eq!(cpu.pc, 0x8003, "return address");
    }

    #[test]
    fn jmp_indirect_page_wrap_bug() {
        // JMP ($02FF) reads high byte from $0200, not $0300
        let mut cpu = cpu_with_prg(&[0x6C, 0xFF, 0x02]);
        cpu.bus.write(0x02FF, 0x34);
        cpu.bus.write(0x0200, 0x12);
        cpu.bus.write(0x0300, 0x56);
        cpu.step();
        assert_eq!(cpu.pc, 0x1234, "6502 indirect jmp bug");
    }

    #[test]
    fn jam_opcode_corrupts() {
        let mut cpu = cpu_with_prg(&[0x02]);
        cpu.step();
        assert!(cpu.corrupted, "jam corrupts the cpu");
    }

    #[test]
    fn nmi_serviced_before_next_instruction() {
        let mut cpu = cpu_with_prg(&[0xEA, 0xEA]);
        // NMI vector -> $9000 (mirrored into the 16K bank at $1FFA offset)
        cpu.bus.ppu.nmi_pending = true;
        let cycles = cpu.step();
        assert_eq!(cycles, 7, "interrupt sequence cycles");
        assert!(!cpu.bus.ppu.nmi_pending, "nmi consumed");
        assert!(cpu.status.contains(Status::I), "interrupts disabled");
    }

    #[test]
    fn irq_masked_by_interrupt_disable() {
        let mut cpu = cpu_with_prg(&[0xEA]);
        cpu.bus.apu.frame_counter.irq_pending = true;
        assert!(cpu.status.contains(Status::I), "I set after reset");
        let cycles = cpu.step();
        assert_eq!(cycles, 2, "irq not taken while masked");
    }

    #[test]
    fn oam_dma_steals_cycles() {
        // LDA #$02; STA $4014
        let mut cpu = cpu_with_prg(&[0xA9, 0x02, 0x8D, 0x14, 0x40]);
        cpu.step();
        let cycles = cpu.step();
        assert!(cycles == 4 + 513 || cycles == 4 + 514, "dma stall added: {cycles}");
        assert!(cpu.bus.oam_dma_page.is_none(), "dma latch consumed");
    }
}
