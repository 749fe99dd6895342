//! NES PPU (Picture Processing Unit) implementation.
//!
//! See: <https://www.nesdev.org/wiki/PPU>

use crate::{
    common::{NesRegion, Regional, Reset, ResetKind},
    mapper::Mapper,
    ppu::{
        bus::PpuBus, ctrl::PpuCtrl, frame::Frame, mask::PpuMask, scroll::Scroll, status::PpuStatus,
    },
};
use serde::{Deserialize, Serialize};
use tracing::trace;

pub use bus::Mirroring;

pub mod bus;
pub mod ctrl;
pub mod frame;
pub mod mask;
pub mod scroll;
pub mod status;

/// Background tile fetch latches.
#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
struct TileFetch {
    nt: u8,
    attr: u8, // 2-bit palette for the fetched tile
    lo: u8,
    hi: u8,
}

/// A sprite latched for the current scanline.
#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
struct Sprite {
    x: u8,
    attr: u8,
    lo: u8,
    hi: u8,
    index: u8, // OAM slot, for sprite-0 hit detection
}

/// NES PPU.
///
/// Stepped one pixel clock at a time by the console's clock loop; reports
/// frame completion from [`Ppu::clock`] and latches NMI toward the CPU at the
/// start of vblank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Ppu {
    pub region: NesRegion,
    pub cycle: u32,    // 0..=340
    pub scanline: u32, // 0..=prerender
    pub frame: Frame,
    pub ctrl: PpuCtrl,
    pub mask: PpuMask,
    pub status: PpuStatus,
    pub scroll: Scroll,
    pub bus: PpuBus,
    pub oam: Vec<u8>,
    pub oam_addr: u8,
    pub read_buffer: u8,
    pub open_bus: u8,
    /// Edge-latched NMI line toward the CPU; consumed when serviced.
    pub nmi_pending: bool,
    pub odd_frame: bool,
    // Background shift registers and fetch latches
    bg_lo: u16,
    bg_hi: u16,
    bg_attr_lo: u16,
    bg_attr_hi: u16,
    next_tile: TileFetch,
    scanline_sprites: Vec<Sprite>,
    scanline_irq: bool,
}

impl Ppu {
    pub const WIDTH: u32 = frame::WIDTH;
    pub const HEIGHT: u32 = frame::HEIGHT;
    pub const SIZE: usize = frame::SIZE;

    const OAM_SIZE: usize = 256;
    const VBLANK_SCANLINE: u32 = 241;
    const CYCLE_END: u32 = 340;
    // PPU cycle within each rendered scanline observable by MMC3-style
    // scanline counters (the A12 rising edge under standard CHR layouts)
    const SCANLINE_EDGE_CYCLE: u32 = 260;

    pub fn new(region: NesRegion) -> Self {
        Self {
            region,
            cycle: 0,
            scanline: 0,
            frame: Frame::new(),
            ctrl: PpuCtrl::default(),
            mask: PpuMask::default(),
            status: PpuStatus::default(),
            scroll: Scroll::default(),
            bus: PpuBus::new(),
            oam: vec![0x00; Self::OAM_SIZE],
            oam_addr: 0x00,
            read_buffer: 0x00,
            open_bus: 0x00,
            nmi_pending: false,
            odd_frame: false,
            bg_lo: 0,
            bg_hi: 0,
            bg_attr_lo: 0,
            bg_attr_hi: 0,
            next_tile: TileFetch::default(),
            scanline_sprites: Vec::with_capacity(8),
            scanline_irq: false,
        }
    }

    /// Index of the prerender scanline, also the last scanline of a frame.
    #[must_use]
    pub const fn prerender_scanline(&self) -> u32 {
        match self.region {
            NesRegion::Auto | NesRegion::Ntsc => 261,
            NesRegion::Pal => 311,
        }
    }

    #[must_use]
    pub const fn frame_number(&self) -> u32 {
        self.frame.number
    }

    /// Raw frame buffer of system palette indices.
    #[must_use]
    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame.buffer
    }

    pub fn load_mapper(&mut self, mapper: Mapper) {
        self.bus.load_mapper(mapper);
    }

    /// True for exactly one PPU cycle per rendered scanline, at the
    /// mapper-observable edge. Queried by the clock loop right after
    /// [`Ppu::clock`].
    #[must_use]
    pub const fn scanline_counter_trigger(&self) -> bool {
        self.scanline_irq
    }

    // Register access from the CPU bus

    /// $2000 PPUCTRL write.
    pub fn write_ctrl(&mut self, val: u8) {
        let was_enabled = self.ctrl.nmi_enabled();
        self.ctrl = PpuCtrl::from_bits_truncate(val);
        self.scroll.write_nametable(val);
        // Enabling NMI during vblank raises it immediately
        if !was_enabled && self.ctrl.nmi_enabled() && self.status.in_vblank() {
            self.nmi_pending = true;
        }
    }

    /// $2001 PPUMASK write.
    pub fn write_mask(&mut self, val: u8) {
        self.mask = PpuMask::from_bits_truncate(val);
    }

    /// $2002 PPUSTATUS read. Clears vblank and the write latch.
    pub fn read_status(&mut self) -> u8 {
        let status = self.peek_status();
        self.status.remove(PpuStatus::VBLANK_STARTED);
        self.scroll.write_latch = false;
        status
    }

    #[must_use]
    pub const fn peek_status(&self) -> u8 {
        self.status.bits() | (self.open_bus & 0x1F)
    }

    /// $2003 OAMADDR write.
    pub fn write_oamaddr(&mut self, val: u8) {
        self.oam_addr = val;
    }

    /// $2004 OAMDATA read.
    #[must_use]
    pub fn read_oamdata(&self) -> u8 {
        self.oam[self.oam_addr as usize]
    }

    /// $2004 OAMDATA write.
    pub fn write_oamdata(&mut self, val: u8) {
        self.oam[self.oam_addr as usize] = val;
        self.oam_addr = self.oam_addr.wrapping_add(1);
    }

    /// $2005 PPUSCROLL write.
    pub fn write_scroll(&mut self, val: u8) {
        self.scroll.write_scroll(val);
    }

    /// $2006 PPUADDR write.
    pub fn write_addr(&mut self, val: u8) {
        self.scroll.write_addr(val);
    }

    /// $2007 PPUDATA read, through the internal read buffer.
    pub fn read_data(&mut self) -> u8 {
        let addr = self.scroll.addr();
        self.scroll.increment(self.ctrl.vram_increment());
        if addr >= 0x3F00 {
            // Palette reads bypass the buffer, which latches the nametable
            // byte underneath instead
            self.read_buffer = self.bus.peek(addr & 0x2FFF);
            self.bus.read(addr)
        } else {
            let buffered = self.read_buffer;
            self.read_buffer = self.bus.read(addr);
            buffered
        }
    }

    #[must_use]
    pub fn peek_data(&self) -> u8 {
        let addr = self.scroll.addr();
        if addr >= 0x3F00 {
            self.bus.peek(addr)
        } else {
            self.read_buffer
        }
    }

    /// $2007 PPUDATA write.
    pub fn write_data(&mut self, val: u8) {
        let addr = self.scroll.addr();
        self.scroll.increment(self.ctrl.vram_increment());
        self.bus.write(addr, val);
    }

    // Background fetch pipeline

    fn shift_bg(&mut self) {
        self.bg_lo <<= 1;
        self.bg_hi <<= 1;
        self.bg_attr_lo <<= 1;
        self.bg_attr_hi <<= 1;
    }

    fn reload_shifters(&mut self) {
        self.bg_lo = (self.bg_lo & 0xFF00) | u16::from(self.next_tile.lo);
        self.bg_hi = (self.bg_hi & 0xFF00) | u16::from(self.next_tile.hi);
        let attr_lo = if self.next_tile.attr & 0x01 == 0x01 { 0xFF } else { 0x00 };
        let attr_hi = if self.next_tile.attr & 0x02 == 0x02 { 0xFF } else { 0x00 };
        self.bg_attr_lo = (self.bg_attr_lo & 0xFF00) | attr_lo;
        self.bg_attr_hi = (self.bg_attr_hi & 0xFF00) | attr_hi;
    }

    fn pattern_addr(&self) -> u16 {
        self.ctrl.bg_select() + u16::from(self.next_tile.nt) * 16 + self.scroll.fine_y()
    }

    fn fetch_bg(&mut self) {
        match self.cycle % 8 {
            1 => {
                self.reload_shifters();
                self.next_tile.nt = self.bus.read(self.scroll.nametable_addr());
            }
            3 => {
                let attr = self.bus.read(self.scroll.attr_addr());
                self.next_tile.attr = (attr >> self.scroll.attr_shift()) & 0x03;
            }
            5 => self.next_tile.lo = self.bus.read(self.pattern_addr()),
            7 => self.next_tile.hi = self.bus.read(self.pattern_addr() + 8),
            0 => self.scroll.increment_x(),
            _ => (),
        }
    }

    // Sprites

    fn evaluate_sprites(&mut self, line: u32) {
        self.scanline_sprites.clear();
        if line >= Self::HEIGHT {
            return;
        }
        let height = u32::from(self.ctrl.spr_height());
        for index in 0..64 {
            let oam_offset = index * 4;
            let top = u32::from(self.oam[oam_offset]) + 1;
            if line < top || line >= top + height {
                continue;
            }
            if self.scanline_sprites.len() == 8 {
                self.status.insert(PpuStatus::SPR_OVERFLOW);
                break;
            }
            let mut row = line - top;
            let attr = self.oam[oam_offset + 2];
            if attr & 0x80 == 0x80 {
                row = height - 1 - row;
            }
            let tile = self.oam[oam_offset + 1];
            let addr = if height == 16 {
                let table = u16::from(tile & 0x01) * 0x1000;
                let tile = u16::from(tile & 0xFE) + u16::from(row >= 8);
                table + tile * 16 + (row as u16 & 0x07)
            } else {
                self.ctrl.spr_select() + u16::from(tile) * 16 + row as u16
            };
            let lo = self.bus.read(addr);
            let hi = self.bus.read(addr + 8);
            self.scanline_sprites.push(Sprite {
                x: self.oam[oam_offset + 3],
                attr,
                lo,
                hi,
                index: index as u8,
            });
        }
    }

    fn render_pixel(&mut self) {
        let x = self.cycle - 1;
        let y = self.scanline;

        let mut bg_color = 0u8;
        let mut bg_palette = 0u8;
        if self.mask.show_bg() && (x >= 8 || self.mask.contains(PpuMask::SHOW_BG_LEFT)) {
            let bit = 15 - u16::from(self.scroll.fine_x);
            let lo = (self.bg_lo >> bit) & 0x01;
            let hi = (self.bg_hi >> bit) & 0x01;
            bg_color = ((hi << 1) | lo) as u8;
            let pal_lo = (self.bg_attr_lo >> bit) & 0x01;
            let pal_hi = (self.bg_attr_hi >> bit) & 0x01;
            bg_palette = ((pal_hi << 1) | pal_lo) as u8;
        }

        let mut spr_color = 0u8;
        let mut spr_palette = 0u8;
        let mut spr_behind = false;
        let mut spr_zero = false;
        if self.mask.show_spr() && (x >= 8 || self.mask.contains(PpuMask::SHOW_SPR_LEFT)) {
            for sprite in &self.scanline_sprites {
                let sx = u32::from(sprite.x);
                if x < sx || x >= sx + 8 {
                    continue;
                }
                let mut bit = (x - sx) as u8;
                if sprite.attr & 0x40 == 0x40 {
                    bit = 7 - bit;
                }
                let lo = (sprite.lo >> (7 - bit)) & 0x01;
                let hi = (sprite.hi >> (7 - bit)) & 0x01;
                let color = (hi << 1) | lo;
                if color == 0 {
                    continue;
                }
                spr_color = color;
                spr_palette = sprite.attr & 0x03;
                spr_behind = sprite.attr & 0x20 == 0x20;
                spr_zero = sprite.index == 0;
                break;
            }
        }

        if spr_zero && spr_color != 0 && bg_color != 0 && x < 255 {
            self.status.insert(PpuStatus::SPR_ZERO_HIT);
        }

        let palette_addr = if spr_color != 0 && (bg_color == 0 || !spr_behind) {
            0x3F10 + u16::from(spr_palette) * 4 + u16::from(spr_color)
        } else if bg_color != 0 {
            0x3F00 + u16::from(bg_palette) * 4 + u16::from(bg_color)
        } else {
            0x3F00
        };
        let color = self.bus.peek(palette_addr) & 0x3F;
        self.frame.set_pixel(x, y, color);
    }

    /// Consume exactly one PPU cycle. Returns `true` on the cycle that
    /// completes a frame.
    pub fn clock(&mut self) -> bool {
        self.scanline_irq = false;
        let prerender = self.prerender_scanline();
        let visible = self.scanline < Self::HEIGHT;
        let rendering = self.mask.rendering_enabled();
        let mut frame_complete = false;

        if visible || self.scanline == prerender {
            if rendering {
                match self.cycle {
                    1..=256 | 321..=336 => {
                        // Shift before sampling so bit 15 holds this pixel
                        self.shift_bg();
                        if visible && self.cycle <= 256 {
                            self.render_pixel();
                        }
                        self.fetch_bg();
                        if self.cycle == 256 {
                            self.scroll.increment_y();
                        }
                    }
                    257 => {
                        self.scroll.copy_x();
                        let next_line = if self.scanline == prerender {
                            0
                        } else {
                            self.scanline + 1
                        };
                        self.evaluate_sprites(next_line);
                    }
                    280..=304 if self.scanline == prerender => self.scroll.copy_y(),
                    _ => (),
                }
                if self.cycle == Self::SCANLINE_EDGE_CYCLE {
                    self.scanline_irq = true;
                }
            } else if visible && matches!(self.cycle, 1..=256) {
                let color = self.bus.peek(0x3F00) & 0x3F;
                self.frame.set_pixel(self.cycle - 1, self.scanline, color);
            }

            if self.scanline == prerender && self.cycle == 1 {
                self.status.remove(
                    PpuStatus::VBLANK_STARTED | PpuStatus::SPR_ZERO_HIT | PpuStatus::SPR_OVERFLOW,
                );
                self.nmi_pending = false;
            }
        } else if self.scanline == Self::VBLANK_SCANLINE && self.cycle == 1 {
            self.status.insert(PpuStatus::VBLANK_STARTED);
            if self.ctrl.nmi_enabled() {
                self.nmi_pending = true;
            }
            self.frame.increment();
            frame_complete = true;
            trace!("frame {} complete", self.frame.number);
        }

        // Advance counters; on NTSC odd frames the prerender line is one
        // cycle short when rendering is enabled
        self.cycle += 1;
        let odd_frame_skip = self.region.is_ntsc()
            && rendering
            && self.odd_frame
            && self.scanline == prerender
            && self.cycle == Self::CYCLE_END;
        if self.cycle > Self::CYCLE_END || odd_frame_skip {
            self.cycle = 0;
            self.scanline += 1;
            if self.scanline > prerender {
                self.scanline = 0;
                self.odd_frame = !self.odd_frame;
            }
        }

        frame_complete
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new(NesRegion::Ntsc)
    }
}

impl Regional for Ppu {
    fn region(&self) -> NesRegion {
        self.region
    }

    fn set_region(&mut self, region: NesRegion) {
        self.region = region;
    }
}

impl Reset for Ppu {
    fn reset(&mut self, kind: ResetKind) {
        self.cycle = 0;
        self.scanline = 0;
        self.ctrl = PpuCtrl::default();
        self.mask = PpuMask::default();
        self.status = PpuStatus::default();
        self.scroll = Scroll::default();
        self.oam_addr = 0x00;
        self.read_buffer = 0x00;
        self.open_bus = 0x00;
        self.nmi_pending = false;
        self.odd_frame = false;
        self.bg_lo = 0;
        self.bg_hi = 0;
        self.bg_attr_lo = 0;
        self.bg_attr_hi = 0;
        self.next_tile = TileFetch::default();
        self.scanline_sprites.clear();
        self.scanline_irq = false;
        if kind == ResetKind::Hard {
            self.oam.fill(0x00);
            self.frame.number = 0;
        }
        self.frame.clear();
        self.bus.reset(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NTSC_FRAME_CYCLES: u32 = 341 * 262;

    fn clock_to(ppu: &mut Ppu, scanline: u32, cycle: u32) {
        while !(ppu.scanline == scanline && ppu.cycle == cycle) {
            ppu.clock();
        }
    }

    #[test]
    fn vblank_begins_at_241_1() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        clock_to(&mut ppu, Ppu::VBLANK_SCANLINE, 1);
        assert!(!ppu.status.in_vblank(), "not yet in vblank");
        ppu.clock();
        assert!(ppu.status.in_vblank(), "vblank set at 241,1");
    }

    #[test]
    fn frame_completes_once_per_frame() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        let mut completions = 0;
        for _ in 0..2 * NTSC_FRAME_CYCLES {
            if ppu.clock() {
                completions += 1;
            }
        }
        assert_eq!(completions, 2, "exactly one completion per frame");
        assert_eq!(ppu.frame_number(), 2, "frame number advanced");
    }

    #[test]
    fn nmi_latched_only_when_enabled() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        clock_to(&mut ppu, Ppu::VBLANK_SCANLINE, 1);
        ppu.clock();
        assert!(!ppu.nmi_pending, "nmi disabled by default");

        ppu.reset(ResetKind::Hard);
        ppu.write_ctrl(0x80);
        clock_to(&mut ppu, Ppu::VBLANK_SCANLINE, 1);
        ppu.clock();
        assert!(ppu.nmi_pending, "nmi latched at vblank");
    }

    #[test]
    fn enabling_nmi_mid_vblank_latches() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        clock_to(&mut ppu, Ppu::VBLANK_SCANLINE, 10);
        assert!(ppu.status.in_vblank(), "in vblank");
        assert!(!ppu.nmi_pending, "nothing latched yet");
        ppu.write_ctrl(0x80);
        assert!(ppu.nmi_pending, "latched by ctrl write during vblank");
    }

    #[test]
    fn status_read_clears_vblank_and_latch() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        clock_to(&mut ppu, Ppu::VBLANK_SCANLINE, 2);
        ppu.scroll.write_latch = true;
        let status = ppu.read_status();
        assert_eq!(status & 0x80, 0x80, "vblank visible in read");
        assert!(!ppu.status.in_vblank(), "read clears vblank");
        assert!(!ppu.scroll.write_latch, "read clears write latch");
    }

    #[test]
    fn scanline_trigger_once_per_rendered_line() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        ppu.write_mask(0x18); // rendering on
        let mut triggers = 0;
        for _ in 0..NTSC_FRAME_CYCLES {
            ppu.clock();
            if ppu.scanline_counter_trigger() {
                triggers += 1;
            }
        }
        // 240 visible scanlines + prerender
        assert_eq!(triggers, 241, "one trigger per rendered scanline");
    }

    #[test]
    fn no_scanline_trigger_when_rendering_disabled() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        let mut triggers = 0;
        for _ in 0..NTSC_FRAME_CYCLES {
            ppu.clock();
            triggers += usize::from(ppu.scanline_counter_trigger());
        }
        assert_eq!(triggers, 0, "no triggers with rendering off");
    }

    #[test]
    fn pal_has_312_scanlines() {
        let mut ppu = Ppu::new(NesRegion::Pal);
        assert_eq!(ppu.prerender_scanline(), 311, "pal prerender line");
        let mut completions = 0;
        for _ in 0..341 * 312 {
            completions += usize::from(ppu.clock());
        }
        assert_eq!(completions, 1, "one frame per 312 scanlines");
    }

    #[test]
    fn vram_data_read_is_buffered() {
        let mut ppu = Ppu::new(NesRegion::Ntsc);
        ppu.bus.write(0x2005, 0x66);
        ppu.write_addr(0x20);
        ppu.write_addr(0x05);
        let first = ppu.read_data();
        let second = ppu.read_data();
        assert_eq!(first, 0x00, "first read returns stale buffer");
        assert_eq!(second, 0x66, "second read returns vram data");
    }
}
