//! NES APU (Audio Processing Unit) implementation.
//!
//! See: <https://www.nesdev.org/wiki/APU>

use crate::{
    apu::{dmc::Dmc, frame_counter::FrameCounter, noise::Noise, pulse::{Pulse, PulseChannel}, triangle::Triangle},
    common::{Clock, NesRegion, Regional, Reset, ResetKind},
};
use serde::{Deserialize, Serialize};

pub mod dmc;
pub mod envelope;
pub mod frame_counter;
pub mod length_counter;
pub mod noise;
pub mod pulse;
pub mod triangle;

/// NES APU (Audio Processing Unit).
///
/// Clocked once per CPU cycle; decimates the per-cycle mix down to the output
/// sample rate with an exact integer phase accumulator so emulation remains
/// deterministic across machines and save states.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Apu {
    pub region: NesRegion,
    pub cycle: u64,
    pub frame_counter: FrameCounter,
    pub pulse1: Pulse,
    pub pulse2: Pulse,
    pub triangle: Triangle,
    pub noise: Noise,
    pub dmc: Dmc,
    pub sample_rate: u64,
    pub sample_phase: u64,
    // First-order high-pass state removing the mixer's DC offset
    pub hp_prev_input: f32,
    pub hp_prev_output: f32,
    #[serde(skip)]
    pub samples: Vec<i16>,
}

impl Apu {
    pub const DEFAULT_SAMPLE_RATE: u64 = 44_100;

    pub fn new(region: NesRegion) -> Self {
        Self {
            region,
            cycle: 0,
            frame_counter: FrameCounter::new(region),
            pulse1: Pulse::new(PulseChannel::One),
            pulse2: Pulse::new(PulseChannel::Two),
            triangle: Triangle::new(),
            noise: Noise::new(region),
            dmc: Dmc::new(region),
            sample_rate: Self::DEFAULT_SAMPLE_RATE,
            sample_phase: 0,
            hp_prev_input: 0.0,
            hp_prev_output: 0.0,
            samples: Vec::with_capacity((Self::DEFAULT_SAMPLE_RATE / 60) as usize),
        }
    }

    /// Register writes `$4000..=$4017` (except `$4014`/`$4016`).
    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0x4000 => self.pulse1.write_ctrl(val),
            0x4001 => self.pulse1.write_sweep(val),
            0x4002 => self.pulse1.write_timer_lo(val),
            0x4003 => self.pulse1.write_timer_hi(val),
            0x4004 => self.pulse2.write_ctrl(val),
            0x4005 => self.pulse2.write_sweep(val),
            0x4006 => self.pulse2.write_timer_lo(val),
            0x4007 => self.pulse2.write_timer_hi(val),
            0x4008 => self.triangle.write_linear_counter(val),
            0x400A => self.triangle.write_timer_lo(val),
            0x400B => self.triangle.write_timer_hi(val),
            0x400C => self.noise.write_ctrl(val),
            0x400E => self.noise.write_timer(val),
            0x400F => self.noise.write_length(val),
            0x4010 => self.dmc.write_timer(val),
            0x4011 => self.dmc.write_output(val),
            0x4012 => self.dmc.write_addr(val),
            0x4013 => self.dmc.write_length(val),
            0x4015 => self.write_status(val),
            0x4017 => {
                let event = self.frame_counter.write(val);
                if event.quarter {
                    self.clock_quarter_frame();
                }
                if event.half {
                    self.clock_half_frame();
                }
            }
            _ => (),
        }
    }

    /// `$4015` read: channel length status and IRQ flags. Clears the frame
    /// IRQ flag.
    pub fn read_status(&mut self) -> u8 {
        let status = self.peek_status();
        self.frame_counter.irq_pending = false;
        status
    }

    #[must_use]
    pub fn peek_status(&self) -> u8 {
        let mut status = 0x00;
        if self.pulse1.length.active() {
            status |= 0x01;
        }
        if self.pulse2.length.active() {
            status |= 0x02;
        }
        if self.triangle.length.active() {
            status |= 0x04;
        }
        if self.noise.length.active() {
            status |= 0x08;
        }
        if self.dmc.active() {
            status |= 0x10;
        }
        if self.frame_counter.irq_pending {
            status |= 0x40;
        }
        if self.dmc.irq_pending {
            status |= 0x80;
        }
        status
    }

    /// `$4015` write: channel enables.
    fn write_status(&mut self, val: u8) {
        self.pulse1.length.set_enabled(val & 0x01 == 0x01);
        self.pulse2.length.set_enabled(val & 0x02 == 0x02);
        self.triangle.length.set_enabled(val & 0x04 == 0x04);
        self.noise.length.set_enabled(val & 0x08 == 0x08);
        self.dmc.set_enabled(val & 0x10 == 0x10);
    }

    /// Level-triggered IRQ line into the CPU.
    #[must_use]
    pub const fn irq_pending(&self) -> bool {
        self.frame_counter.irq_pending || self.dmc.irq_pending
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.clock_quarter_frame();
        self.pulse2.clock_quarter_frame();
        self.triangle.clock_quarter_frame();
        self.noise.clock_quarter_frame();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.clock_half_frame();
        self.pulse2.clock_half_frame();
        self.triangle.clock_half_frame();
        self.noise.clock_half_frame();
    }

    /// Non-linear mixer approximation.
    ///
    /// See: <https://www.nesdev.org/wiki/APU_Mixer>
    fn mix(&self) -> f32 {
        let pulse1 = f32::from(self.pulse1.output());
        let pulse2 = f32::from(self.pulse2.output());
        let triangle = f32::from(self.triangle.output());
        let noise = f32::from(self.noise.output());
        let dmc = f32::from(self.dmc.output());

        let pulse_out = if pulse1 + pulse2 > 0.0 {
            95.88 / (8128.0 / (pulse1 + pulse2) + 100.0)
        } else {
            0.0
        };
        let tnd = triangle / 8227.0 + noise / 12241.0 + dmc / 22638.0;
        let tnd_out = if tnd > 0.0 {
            159.79 / (1.0 / tnd + 100.0)
        } else {
            0.0
        };
        pulse_out + tnd_out
    }

    fn emit_sample(&mut self) {
        let input = self.mix();
        let output = 0.995 * (self.hp_prev_output + input - self.hp_prev_input);
        self.hp_prev_input = input;
        self.hp_prev_output = output;
        let sample = (output * 2.0 * f32::from(i16::MAX)).clamp(
            f32::from(i16::MIN),
            f32::from(i16::MAX),
        );
        self.samples.push(sample as i16);
    }

    /// Drain samples produced since the last call.
    pub fn drain_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }
}

impl Clock for Apu {
    /// Advance one CPU cycle.
    fn clock(&mut self) {
        self.cycle = self.cycle.wrapping_add(1);

        let event = self.frame_counter.clock();
        if event.quarter {
            self.clock_quarter_frame();
        }
        if event.half {
            self.clock_half_frame();
        }

        self.triangle.clock_timer();
        // Pulse, noise and DMC timers run at half the CPU clock
        if self.cycle & 0x01 == 0x00 {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
            self.noise.clock_timer();
            self.dmc.clock_timer();
        }

        self.sample_phase += self.sample_rate;
        let clock_rate = self.region.cpu_clock_rate();
        if self.sample_phase >= clock_rate {
            self.sample_phase -= clock_rate;
            self.emit_sample();
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new(NesRegion::Ntsc)
    }
}

impl Regional for Apu {
    fn region(&self) -> NesRegion {
        self.region
    }

    fn set_region(&mut self, region: NesRegion) {
        self.region = region;
        self.frame_counter.set_region(region);
        self.noise.region = region;
        self.dmc.region = region;
    }
}

impl Reset for Apu {
    fn reset(&mut self, kind: ResetKind) {
        self.cycle = 0;
        self.frame_counter.reset(kind);
        self.pulse1.reset(kind);
        self.pulse2.reset(kind);
        self.triangle.reset(kind);
        self.noise.reset(kind);
        self.dmc.reset(kind);
        self.sample_phase = 0;
        self.hp_prev_input = 0.0;
        self.hp_prev_output = 0.0;
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_decimation() {
        let mut apu = Apu::new(NesRegion::Ntsc);
        // One NTSC frame of CPU cycles should yield ~44100/60.0988 samples
        let cycles_per_frame = 29_780;
        for _ in 0..cycles_per_frame {
            apu.clock();
        }
        let produced = apu.drain_samples().len();
        assert!(
            (733..=735).contains(&produced),
            "expected ~734 samples per frame, got {produced}"
        );
    }

    #[test]
    fn status_reflects_lengths() {
        let mut apu = Apu::new(NesRegion::Ntsc);
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4003, 0x08); // load pulse1 length
        assert_eq!(apu.read_status() & 0x01, 0x01, "pulse1 active");

        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.read_status() & 0x01, 0x00, "disable clears length");
    }

    #[test]
    fn frame_irq_set_and_cleared_by_status_read() {
        let mut apu = Apu::new(NesRegion::Ntsc);
        for _ in 0..29_829 {
            apu.clock();
        }
        assert!(apu.irq_pending(), "frame irq pending");
        let status = apu.read_status();
        assert_eq!(status & 0x40, 0x40, "frame irq visible in status");
        assert!(!apu.irq_pending(), "status read clears frame irq");
    }

    #[test]
    fn silence_settles_to_zero() {
        let mut apu = Apu::new(NesRegion::Ntsc);
        // Let the high-pass filter absorb the mixer's DC offset
        for _ in 0..1_000_000 {
            apu.clock();
        }
        apu.clear_samples();
        for _ in 0..100_000 {
            apu.clock();
        }
        let samples = apu.drain_samples();
        assert!(!samples.is_empty(), "samples produced");
        assert!(
            samples.iter().all(|s| s.abs() < 16),
            "silent mix settles to zero"
        );
    }
}
