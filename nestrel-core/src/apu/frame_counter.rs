//! APU frame counter.
//!
//! See: <https://www.nesdev.org/wiki/APU_Frame_Counter>

use crate::common::{NesRegion, Regional, Reset, ResetKind};
use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum FcMode {
    #[default]
    Step4,
    Step5,
}

/// Sequencer events produced by a single frame-counter clock.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct FrameEvent {
    pub quarter: bool,
    pub half: bool,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct FrameCounter {
    pub region: NesRegion,
    pub mode: FcMode,
    pub cycle: u32,
    pub irq_inhibit: bool,
    pub irq_pending: bool,
}

impl FrameCounter {
    // Quarter-frame boundaries in CPU cycles, 4-step then 5-step mode.
    const NTSC_STEP4: [u32; 4] = [7_457, 14_913, 22_371, 29_829];
    const NTSC_STEP5: [u32; 4] = [7_457, 14_913, 22_371, 37_281];
    const PAL_STEP4: [u32; 4] = [8_313, 16_627, 24_939, 33_253];
    const PAL_STEP5: [u32; 4] = [8_313, 16_627, 24_939, 41_565];

    pub const fn new(region: NesRegion) -> Self {
        Self {
            region,
            mode: FcMode::Step4,
            cycle: 0,
            irq_inhibit: false,
            irq_pending: false,
        }
    }

    const fn steps(&self) -> &'static [u32; 4] {
        match (self.region, self.mode) {
            (NesRegion::Auto | NesRegion::Ntsc, FcMode::Step4) => &Self::NTSC_STEP4,
            (NesRegion::Auto | NesRegion::Ntsc, FcMode::Step5) => &Self::NTSC_STEP5,
            (NesRegion::Pal, FcMode::Step4) => &Self::PAL_STEP4,
            (NesRegion::Pal, FcMode::Step5) => &Self::PAL_STEP5,
        }
    }

    /// `$4017` write.
    ///
    /// Switching into 5-step mode clocks the sequencer immediately; setting
    /// the inhibit flag acknowledges a pending frame IRQ.
    pub fn write(&mut self, val: u8) -> FrameEvent {
        self.mode = if val & 0x80 == 0x80 {
            FcMode::Step5
        } else {
            FcMode::Step4
        };
        self.irq_inhibit = val & 0x40 == 0x40;
        if self.irq_inhibit {
            self.irq_pending = false;
        }
        self.cycle = 0;
        if self.mode == FcMode::Step5 {
            FrameEvent {
                quarter: true,
                half: true,
            }
        } else {
            FrameEvent::default()
        }
    }

    /// Advance one CPU cycle, reporting any quarter/half frame boundary.
    pub fn clock(&mut self) -> FrameEvent {
        self.cycle += 1;
        let steps = self.steps();
        let mut event = FrameEvent::default();
        for (step, boundary) in steps.iter().enumerate() {
            if self.cycle == *boundary {
                event.quarter = true;
                event.half = step % 2 == 1;
                if step == 3 {
                    if self.mode == FcMode::Step4 && !self.irq_inhibit {
                        self.irq_pending = true;
                    }
                    self.cycle = 0;
                }
                break;
            }
        }
        event
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(NesRegion::Ntsc)
    }
}

impl Regional for FrameCounter {
    fn region(&self) -> NesRegion {
        self.region
    }

    fn set_region(&mut self, region: NesRegion) {
        self.region = region;
    }
}

impl Reset for FrameCounter {
    fn reset(&mut self, _kind: ResetKind) {
        self.mode = FcMode::Step4;
        self.cycle = 0;
        self.irq_inhibit = false;
        self.irq_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_step_sequence() {
        let mut fc = FrameCounter::new(NesRegion::Ntsc);
        let mut quarters = 0;
        let mut halves = 0;
        for _ in 0..29_829 {
            let event = fc.clock();
            quarters += usize::from(event.quarter);
            halves += usize::from(event.half);
        }
        assert_eq!(quarters, 4, "four quarter frames per sequence");
        assert_eq!(halves, 2, "two half frames per sequence");
        assert!(fc.irq_pending, "frame irq at end of 4-step sequence");
        assert_eq!(fc.cycle, 0, "sequence wrapped");
    }

    #[test]
    fn five_step_mode_raises_no_irq() {
        let mut fc = FrameCounter::new(NesRegion::Ntsc);
        fc.write(0x80);
        for _ in 0..37_281 {
            fc.clock();
        }
        assert!(!fc.irq_pending, "no irq in 5-step mode");
    }

    #[test]
    fn inhibit_acknowledges_irq() {
        let mut fc = FrameCounter::new(NesRegion::Ntsc);
        for _ in 0..29_829 {
            fc.clock();
        }
        assert!(fc.irq_pending, "irq set");
        fc.write(0x40);
        assert!(!fc.irq_pending, "inhibit clears irq");
    }
}
