//! 6502 instruction execution.
//!
//! <https://www.nesdev.org/obelisk-6502-guide/reference.html>
//!
//! Official opcodes plus the stable unofficial NOP/LAX/SAX family; jam
//! opcodes latch [`Cpu::corrupted`] and halt further useful execution.

use crate::cpu::{Cpu, Status};
use tracing::warn;

impl Cpu {
    // Arithmetic and logic helpers

    fn adc(&mut self, val: u8) {
        let acc = self.acc;
        let sum = u16::from(acc) + u16::from(val) + u16::from(self.status.contains(Status::C));
        let result = sum as u8;
        self.status.set(Status::C, sum > 0xFF);
        self.status
            .set(Status::V, (acc ^ result) & (val ^ result) & 0x80 == 0x80);
        self.set_acc(result);
    }

    fn sbc(&mut self, val: u8) {
        self.adc(!val);
    }

    fn compare(&mut self, reg: u8, val: u8) {
        let result = reg.wrapping_sub(val);
        self.status.set(Status::C, reg >= val);
        self.set_zn_status(result);
    }

    fn bit(&mut self, val: u8) {
        self.status.set(Status::Z, self.acc & val == 0x00);
        self.status.set(Status::V, val & 0x40 == 0x40);
        self.status.set(Status::N, val & 0x80 == 0x80);
    }

    fn asl(&mut self, val: u8) -> u8 {
        self.status.set(Status::C, val & 0x80 == 0x80);
        let result = val << 1;
        self.set_zn_status(result);
        result
    }

    fn lsr(&mut self, val: u8) -> u8 {
        self.status.set(Status::C, val & 0x01 == 0x01);
        let result = val >> 1;
        self.set_zn_status(result);
        result
    }

    fn rol(&mut self, val: u8) -> u8 {
        let carry = u8::from(self.status.contains(Status::C));
        self.status.set(Status::C, val & 0x80 == 0x80);
        let result = (val << 1) | carry;
        self.set_zn_status(result);
        result
    }

    fn ror(&mut self, val: u8) -> u8 {
        let carry = u8::from(self.status.contains(Status::C)) << 7;
        self.status.set(Status::C, val & 0x01 == 0x01);
        let result = (val >> 1) | carry;
        self.set_zn_status(result);
        result
    }

    /// Read-modify-write at `addr`.
    fn rmw(&mut self, addr: u16, f: impl FnOnce(&mut Self, u8) -> u8) {
        let val = self.bus.read(addr);
        let result = f(self, val);
        self.bus.write(addr, result);
    }

    /// Execute the fetched opcode, returning cycles consumed.
    #[allow(clippy::too_many_lines)]
    pub(crate) fn execute(&mut self, opcode: u8) -> u64 {
        match opcode {
            // LDA
            0xA9 => { let a = self.am_imm(); let v = self.bus.read(a); self.set_acc(v); 2 }
            0xA5 => { let a = self.am_zp(); let v = self.bus.read(a); self.set_acc(v); 3 }
            0xB5 => { let a = self.am_zpx(); let v = self.bus.read(a); self.set_acc(v); 4 }
            0xAD => { let a = self.am_abs(); let v = self.bus.read(a); self.set_acc(v); 4 }
            0xBD => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.set_acc(v); 4 + u64::from(crossed) }
            0xB9 => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.set_acc(v); 4 + u64::from(crossed) }
            0xA1 => { let a = self.am_idx(); let v = self.bus.read(a); self.set_acc(v); 6 }
            0xB1 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.set_acc(v); 5 + u64::from(crossed) }
            // LDX
            0xA2 => { let a = self.am_imm(); let v = self.bus.read(a); self.set_x(v); 2 }
            0xA6 => { let a = self.am_zp(); let v = self.bus.read(a); self.set_x(v); 3 }
            0xB6 => { let a = self.am_zpy(); let v = self.bus.read(a); self.set_x(v); 4 }
            0xAE => { let a = self.am_abs(); let v = self.bus.read(a); self.set_x(v); 4 }
            0xBE => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.set_x(v); 4 + u64::from(crossed) }
            // LDY
            0xA0 => { let a = self.am_imm(); let v = self.bus.read(a); self.set_y(v); 2 }
            0xA4 => { let a = self.am_zp(); let v = self.bus.read(a); self.set_y(v); 3 }
            0xB4 => { let a = self.am_zpx(); let v = self.bus.read(a); self.set_y(v); 4 }
            0xAC => { let a = self.am_abs(); let v = self.bus.read(a); self.set_y(v); 4 }
            0xBC => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.set_y(v); 4 + u64::from(crossed) }
            // STA
            0x85 => { let a = self.am_zp(); self.bus.write(a, self.acc); 3 }
            0x95 => { let a = self.am_zpx(); self.bus.write(a, self.acc); 4 }
            0x8D => { let a = self.am_abs(); self.bus.write(a, self.acc); 4 }
            0x9D => { let (a, _) = self.am_abx(); self.bus.write(a, self.acc); 5 }
            0x99 => { let (a, _) = self.am_aby(); self.bus.write(a, self.acc); 5 }
            0x81 => { let a = self.am_idx(); self.bus.write(a, self.acc); 6 }
            0x91 => { let (a, _) = self.am_idy(); self.bus.write(a, self.acc); 6 }
            // STX
            0x86 => { let a = self.am_zp(); self.bus.write(a, self.x); 3 }
            0x96 => { let a = self.am_zpy(); self.bus.write(a, self.x); 4 }
            0x8E => { let a = self.am_abs(); self.bus.write(a, self.x); 4 }
            // STY
            0x84 => { let a = self.am_zp(); self.bus.write(a, self.y); 3 }
            0x94 => { let a = self.am_zpx(); self.bus.write(a, self.y); 4 }
            0x8C => { let a = self.am_abs(); self.bus.write(a, self.y); 4 }
            // Transfers
            0xAA => { self.set_x(self.acc); 2 } // TAX
            0xA8 => { self.set_y(self.acc); 2 } // TAY
            0x8A => { self.set_acc(self.x); 2 } // TXA
            0x98 => { self.set_acc(self.y); 2 } // TYA
            0xBA => { self.set_x(self.sp); 2 } // TSX
            0x9A => { self.sp = self.x; 2 } // TXS
            // Stack
            0x48 => { self.push_byte(self.acc); 3 } // PHA
            0x68 => { let v = self.pop_byte(); self.set_acc(v); 4 } // PLA
            0x08 => { self.push_byte((self.status | Status::B | Status::U).bits()); 3 } // PHP
            0x28 => { // PLP
                let bits = self.pop_byte();
                self.status = Status::from_bits_truncate(bits) & !Status::B | Status::U;
                4
            }
            // ADC
            0x69 => { let a = self.am_imm(); let v = self.bus.read(a); self.adc(v); 2 }
            0x65 => { let a = self.am_zp(); let v = self.bus.read(a); self.adc(v); 3 }
            0x75 => { let a = self.am_zpx(); let v = self.bus.read(a); self.adc(v); 4 }
            0x6D => { let a = self.am_abs(); let v = self.bus.read(a); self.adc(v); 4 }
            0x7D => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.adc(v); 4 + u64::from(crossed) }
            0x79 => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.adc(v); 4 + u64::from(crossed) }
            0x61 => { let a = self.am_idx(); let v = self.bus.read(a); self.adc(v); 6 }
            0x71 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.adc(v); 5 + u64::from(crossed) }
            // SBC (including unofficial $EB)
            0xE9 | 0xEB => { let a = self.am_imm(); let v = self.bus.read(a); self.sbc(v); 2 }
            0xE5 => { let a = self.am_zp(); let v = self.bus.read(a); self.sbc(v); 3 }
            0xF5 => { let a = self.am_zpx(); let v = self.bus.read(a); self.sbc(v); 4 }
            0xED => { let a = self.am_abs(); let v = self.bus.read(a); self.sbc(v); 4 }
            0xFD => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.sbc(v); 4 + u64::from(crossed) }
            0xF9 => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.sbc(v); 4 + u64::from(crossed) }
            0xE1 => { let a = self.am_idx(); let v = self.bus.read(a); self.sbc(v); 6 }
            0xF1 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.sbc(v); 5 + u64::from(crossed) }
            // AND
            0x29 => { let a = self.am_imm(); let v = self.bus.read(a); self.set_acc(self.acc & v); 2 }
            0x25 => { let a = self.am_zp(); let v = self.bus.read(a); self.set_acc(self.acc & v); 3 }
            0x35 => { let a = self.am_zpx(); let v = self.bus.read(a); self.set_acc(self.acc & v); 4 }
            0x2D => { let a = self.am_abs(); let v = self.bus.read(a); self.set_acc(self.acc & v); 4 }
            0x3D => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.set_acc(self.acc & v); 4 + u64::from(crossed) }
            0x39 => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.set_acc(self.acc & v); 4 + u64::from(crossed) }
            0x21 => { let a = self.am_idx(); let v = self.bus.read(a); self.set_acc(self.acc & v); 6 }
            0x31 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.set_acc(self.acc & v); 5 + u64::from(crossed) }
            // ORA
            0x09 => { let a = self.am_imm(); let v = self.bus.read(a); self.set_acc(self.acc | v); 2 }
            0x05 => { let a = self.am_zp(); let v = self.bus.read(a); self.set_acc(self.acc | v); 3 }
            0x15 => { let a = self.am_zpx(); let v = self.bus.read(a); self.set_acc(self.acc | v); 4 }
            0x0D => { let a = self.am_abs(); let v = self.bus.read(a); self.set_acc(self.acc | v); 4 }
            0x1D => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.set_acc(self.acc | v); 4 + u64::from(crossed) }
            0x19 => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.set_acc(self.acc | v); 4 + u64::from(crossed) }
            0x01 => { let a = self.am_idx(); let v = self.bus.read(a); self.set_acc(self.acc | v); 6 }
            0x11 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.set_acc(self.acc | v); 5 + u64::from(crossed) }
            // EOR
            0x49 => { let a = self.am_imm(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 2 }
            0x45 => { let a = self.am_zp(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 3 }
            0x55 => { let a = self.am_zpx(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 4 }
            0x4D => { let a = self.am_abs(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 4 }
            0x5D => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 4 + u64::from(crossed) }
            0x59 => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 4 + u64::from(crossed) }
            0x41 => { let a = self.am_idx(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 6 }
            0x51 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.set_acc(self.acc ^ v); 5 + u64::from(crossed) }
            // CMP
            0xC9 => { let a = self.am_imm(); let v = self.bus.read(a); self.compare(self.acc, v); 2 }
            0xC5 => { let a = self.am_zp(); let v = self.bus.read(a); self.compare(self.acc, v); 3 }
            0xD5 => { let a = self.am_zpx(); let v = self.bus.read(a); self.compare(self.acc, v); 4 }
            0xCD => { let a = self.am_abs(); let v = self.bus.read(a); self.compare(self.acc, v); 4 }
            0xDD => { let (a, crossed) = self.am_abx(); let v = self.bus.read(a); self.compare(self.acc, v); 4 + u64::from(crossed) }
            0xD9 => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.compare(self.acc, v); 4 + u64::from(crossed) }
            0xC1 => { let a = self.am_idx(); let v = self.bus.read(a); self.compare(self.acc, v); 6 }
            0xD1 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.compare(self.acc, v); 5 + u64::from(crossed) }
            // CPX/CPY
            0xE0 => { let a = self.am_imm(); let v = self.bus.read(a); self.compare(self.x, v); 2 }
            0xE4 => { let a = self.am_zp(); let v = self.bus.read(a); self.compare(self.x, v); 3 }
            0xEC => { let a = self.am_abs(); let v = self.bus.read(a); self.compare(self.x, v); 4 }
            0xC0 => { let a = self.am_imm(); let v = self.bus.read(a); self.compare(self.y, v); 2 }
            0xC4 => { let a = self.am_zp(); let v = self.bus.read(a); self.compare(self.y, v); 3 }
            0xCC => { let a = self.am_abs(); let v = self.bus.read(a); self.compare(self.y, v); 4 }
            // BIT
            0x24 => { let a = self.am_zp(); let v = self.bus.read(a); self.bit(v); 3 }
            0x2C => { let a = self.am_abs(); let v = self.bus.read(a); self.bit(v); 4 }
            // Shifts/rotates
            0x0A => { let v = self.asl(self.acc); self.acc = v; 2 }
            0x06 => { let a = self.am_zp(); self.rmw(a, Self::asl); 5 }
            0x16 => { let a = self.am_zpx(); self.rmw(a, Self::asl); 6 }
            0x0E => { let a = self.am_abs(); self.rmw(a, Self::asl); 6 }
            0x1E => { let (a, _) = self.am_abx(); self.rmw(a, Self::asl); 7 }
            0x4A => { let v = self.lsr(self.acc); self.acc = v; 2 }
            0x46 => { let a = self.am_zp(); self.rmw(a, Self::lsr); 5 }
            0x56 => { let a = self.am_zpx(); self.rmw(a, Self::lsr); 6 }
            0x4E => { let a = self.am_abs(); self.rmw(a, Self::lsr); 6 }
            0x5E => { let (a, _) = self.am_abx(); self.rmw(a, Self::lsr); 7 }
            0x2A => { let v = self.rol(self.acc); self.acc = v; 2 }
            0x26 => { let a = self.am_zp(); self.rmw(a, Self::rol); 5 }
            0x36 => { let a = self.am_zpx(); self.rmw(a, Self::rol); 6 }
            0x2E => { let a = self.am_abs(); self.rmw(a, Self::rol); 6 }
            0x3E => { let (a, _) = self.am_abx(); self.rmw(a, Self::rol); 7 }
            0x6A => { let v = self.ror(self.acc); self.acc = v; 2 }
            0x66 => { let a = self.am_zp(); self.rmw(a, Self::ror); 5 }
            0x76 => { let a = self.am_zpx(); self.rmw(a, Self::ror); 6 }
            0x6E => { let a = self.am_abs(); self.rmw(a, Self::ror); 6 }
            0x7E => { let (a, _) = self.am_abx(); self.rmw(a, Self::ror); 7 }
            // INC/DEC
            0xE6 => { let a = self.am_zp(); self.rmw(a, |cpu, v| { let r = v.wrapping_add(1); cpu.set_zn_status(r); r }); 5 }
            0xF6 => { let a = self.am_zpx(); self.rmw(a, |cpu, v| { let r = v.wrapping_add(1); cpu.set_zn_status(r); r }); 6 }
            0xEE => { let a = self.am_abs(); self.rmw(a, |cpu, v| { let r = v.wrapping_add(1); cpu.set_zn_status(r); r }); 6 }
            0xFE => { let (a, _) = self.am_abx(); self.rmw(a, |cpu, v| { let r = v.wrapping_add(1); cpu.set_zn_status(r); r }); 7 }
            0xC6 => { let a = self.am_zp(); self.rmw(a, |cpu, v| { let r = v.wrapping_sub(1); cpu.set_zn_status(r); r }); 5 }
            0xD6 => { let a = self.am_zpx(); self.rmw(a, |cpu, v| { let r = v.wrapping_sub(1); cpu.set_zn_status(r); r }); 6 }
            0xCE => { let a = self.am_abs(); self.rmw(a, |cpu, v| { let r = v.wrapping_sub(1); cpu.set_zn_status(r); r }); 6 }
            0xDE => { let (a, _) = self.am_abx(); self.rmw(a, |cpu, v| { let r = v.wrapping_sub(1); cpu.set_zn_status(r); r }); 7 }
            0xE8 => { self.set_x(self.x.wrapping_add(1)); 2 } // INX
            0xC8 => { self.set_y(self.y.wrapping_add(1)); 2 } // INY
            0xCA => { self.set_x(self.x.wrapping_sub(1)); 2 } // DEX
            0x88 => { self.set_y(self.y.wrapping_sub(1)); 2 } // DEY
            // Jumps and subroutines
            0x4C => { self.pc = self.fetch_word(); 3 } // JMP abs
            0x6C => { // JMP ind, with the page-wrap hardware bug
                let ptr = self.fetch_word();
                let lo = self.bus.read(ptr);
                let hi = if ptr & 0x00FF == 0x00FF {
                    self.bus.read(ptr & 0xFF00)
                } else {
                    self.bus.read(ptr + 1)
                };
                self.pc = u16::from_le_bytes([lo, hi]);
                5
            }
            0x20 => { // JSR
                let target = self.fetch_word();
                self.push_word(self.pc.wrapping_sub(1));
                self.pc = target;
                6
            }
            0x60 => { self.pc = self.pop_word().wrapping_add(1); 6 } // RTS
            0x40 => { // RTI
                let bits = self.pop_byte();
                self.status = Status::from_bits_truncate(bits) & !Status::B | Status::U;
                self.pc = self.pop_word();
                6
            }
            0x00 => self.brk(), // BRK
            // Branches
            0x10 => self.branch(!self.status.contains(Status::N)), // BPL
            0x30 => self.branch(self.status.contains(Status::N)),  // BMI
            0x50 => self.branch(!self.status.contains(Status::V)), // BVC
            0x70 => self.branch(self.status.contains(Status::V)),  // BVS
            0x90 => self.branch(!self.status.contains(Status::C)), // BCC
            0xB0 => self.branch(self.status.contains(Status::C)),  // BCS
            0xD0 => self.branch(!self.status.contains(Status::Z)), // BNE
            0xF0 => self.branch(self.status.contains(Status::Z)),  // BEQ
            // Flags
            0x18 => { self.status.remove(Status::C); 2 } // CLC
            0x38 => { self.status.insert(Status::C); 2 } // SEC
            0x58 => { self.status.remove(Status::I); 2 } // CLI
            0x78 => { self.status.insert(Status::I); 2 } // SEI
            0xB8 => { self.status.remove(Status::V); 2 } // CLV
            0xD8 => { self.status.remove(Status::D); 2 } // CLD
            0xF8 => { self.status.insert(Status::D); 2 } // SED
            // NOPs, official and unofficial
            0xEA | 0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => 2,
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => { let _ = self.am_imm(); 2 }
            0x04 | 0x44 | 0x64 => { let a = self.am_zp(); let _ = self.bus.read(a); 3 }
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => { let a = self.am_zpx(); let _ = self.bus.read(a); 4 }
            0x0C => { let a = self.am_abs(); let _ = self.bus.read(a); 4 }
            0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => {
                let (a, crossed) = self.am_abx();
                let _ = self.bus.read(a);
                4 + u64::from(crossed)
            }
            // LAX (unofficial): LDA + LDX
            0xA7 => { let a = self.am_zp(); let v = self.bus.read(a); self.set_acc(v); self.set_x(v); 3 }
            0xB7 => { let a = self.am_zpy(); let v = self.bus.read(a); self.set_acc(v); self.set_x(v); 4 }
            0xAF => { let a = self.am_abs(); let v = self.bus.read(a); self.set_acc(v); self.set_x(v); 4 }
            0xBF => { let (a, crossed) = self.am_aby(); let v = self.bus.read(a); self.set_acc(v); self.set_x(v); 4 + u64::from(crossed) }
            0xA3 => { let a = self.am_idx(); let v = self.bus.read(a); self.set_acc(v); self.set_x(v); 6 }
            0xB3 => { let (a, crossed) = self.am_idy(); let v = self.bus.read(a); self.set_acc(v); self.set_x(v); 5 + u64::from(crossed) }
            // SAX (unofficial): store A & X
            0x87 => { let a = self.am_zp(); self.bus.write(a, self.acc & self.x); 3 }
            0x97 => { let a = self.am_zpy(); self.bus.write(a, self.acc & self.x); 4 }
            0x8F => { let a = self.am_abs(); self.bus.write(a, self.acc & self.x); 4 }
            0x83 => { let a = self.am_idx(); self.bus.write(a, self.acc & self.x); 6 }
            // Anything else jams the CPU
            _ => {
                warn!("unsupported opcode ${opcode:02X} at ${:04X}", self.pc.wrapping_sub(1));
                self.corrupted = true;
                2
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bus::Bus,
        cart::Cart,
        common::{Reset, ResetKind},
        cpu::{Cpu, Status},
    };

    fn cpu_with_prg(prg: &[u8]) -> Cpu {
        let mut cart = Cart::empty();
        cart.prg_rom[..prg.len()].copy_from_slice(prg);
        cart.prg_rom[0x3FFC] = 0x00;
        cart.prg_rom[0x3FFD] = 0x80;
        let mut cpu = Cpu::new(Bus::default());
        cpu.bus.load_cart(cart);
        cpu.reset(ResetKind::Hard);
        cpu
    }

    #[test]
    fn sbc_borrow_semantics() {
        // SEC; LDA #$10; SBC #$08
        let mut cpu = cpu_with_prg(&[0x38, 0xA9, 0x10, 0xE9, 0x08]);
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.acc, 0x08, "difference");
        assert!(cpu.status.contains(Status::C), "no borrow");
    }

    #[test]
    fn rmw_inc_sets_flags() {
        // INC $10 with $10 = $FF wraps to zero
        let mut cpu = cpu_with_prg(&[0xE6, 0x10]);
        cpu.bus.write(0x0010, 0xFF);
        let cycles = cpu.step();
        assert_eq!(cycles, 5, "inc zp cycles");
        assert_eq!(cpu.bus.peek(0x0010), 0x00, "wrapped");
        assert!(cpu.status.contains(Status::Z), "zero flag");
    }

    #[test]
    fn php_sets_break_on_stack_only() {
        let mut cpu = cpu_with_prg(&[0x08, 0x28]);
        cpu.step();
        let pushed = cpu.bus.peek(0x0100 | u16::from(cpu.sp.wrapping_add(1)));
        assert_eq!(pushed & 0x30, 0x30, "B and U set on pushed copy");
        cpu.step();
        assert!(!cpu.status.contains(Status::B), "B not live in status");
    }

    #[test]
    fn indexed_zero_page_wraps() {
        // LDX #$05; LDA $FF,X reads $04, not $0104
        let mut cpu = cpu_with_prg(&[0xA2, 0x05, 0xB5, 0xFF]);
        cpu.bus.write(0x0004, 0x77);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.acc, 0x77, "zero page wraps");
    }

    #[test]
    fn bit_transfers_v_and_n() {
        let mut cpu = cpu_with_prg(&[0xA9, 0xFF, 0x24, 0x20]);
        cpu.bus.write(0x0020, 0xC0);
        cpu.step();
        cpu.step();
        assert!(cpu.status.contains(Status::V), "V from bit 6");
        assert!(cpu.status.contains(Status::N), "N from bit 7");
        assert!(!cpu.status.contains(Status::Z), "acc & val nonzero");
    }

    #[test]
    fn lax_loads_both_registers() {
        let mut cpu = cpu_with_prg(&[0xA7, 0x42]);
        cpu.bus.write(0x0042, 0x5A);
        cpu.step();
        assert_eq!(cpu.acc, 0x5A, "acc");
        assert_eq!(cpu.x, 0x5A, "x");
    }

    #[test]
    fn brk_vectors_through_irq() {
        let mut cpu = cpu_with_prg(&[0x00]);
        let cycles = cpu.step();
        assert_eq!(cycles, 7, "brk cycles");
        assert!(cpu.status.contains(Status::I), "interrupts disabled");
        let pushed_status = cpu.bus.peek(0x0100 | u16::from(cpu.sp.wrapping_add(1)));
        assert_eq!(pushed_status & 0x10, 0x10, "B set on pushed status");
    }
}
