//! Two-port [`Joypad`] input latch, memory-mapped at `$4016`/`$4017`.

use crate::common::{Reset, ResetKind};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[must_use]
#[error("failed to parse `Player`")]
pub struct ParsePlayerError;

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum Player {
    #[default]
    One,
    Two,
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::One => "One",
            Self::Two => "Two",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<usize> for Player {
    type Error = ParsePlayerError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::One),
            1 => Ok(Self::Two),
            _ => Err(ParsePlayerError),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum JoypadBtn {
    A,
    B,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
}

bitflags! {
    /// Buttons in shift-register order: A reads out first.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[must_use]
    pub struct JoypadBtnState: u8 {
        const A = 0x01;
        const B = 0x02;
        const SELECT = 0x04;
        const START = 0x08;
        const UP = 0x10;
        const DOWN = 0x20;
        const LEFT = 0x40;
        const RIGHT = 0x80;
    }
}

impl From<JoypadBtn> for JoypadBtnState {
    fn from(btn: JoypadBtn) -> Self {
        match btn {
            JoypadBtn::A => Self::A,
            JoypadBtn::B => Self::B,
            JoypadBtn::Select => Self::SELECT,
            JoypadBtn::Start => Self::START,
            JoypadBtn::Up => Self::UP,
            JoypadBtn::Down => Self::DOWN,
            JoypadBtn::Left => Self::LEFT,
            JoypadBtn::Right => Self::RIGHT,
        }
    }
}

/// A standard NES controller: eight buttons latched by strobe and shifted out
/// one bit per read.
#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Joypad {
    pub buttons: JoypadBtnState,
    index: u8,
    strobe: bool,
}

impl Joypad {
    pub fn set_button(&mut self, btn: JoypadBtn, pressed: bool) {
        self.buttons.set(btn.into(), pressed);
    }

    #[must_use]
    pub const fn button(&self, state: JoypadBtnState) -> bool {
        self.buttons.contains(state)
    }

    pub fn read(&mut self) -> u8 {
        let val = self.peek();
        if !self.strobe && self.index < 8 {
            self.index += 1;
        }
        val
    }

    #[must_use]
    pub fn peek(&self) -> u8 {
        if self.index < 8 {
            (self.buttons.bits() >> self.index) & 0x01
        } else {
            // Official controllers report 1 once the shift register is empty
            0x01
        }
    }

    pub fn write(&mut self, val: u8) {
        self.strobe = val & 0x01 == 0x01;
        // The shift register reloads continuously while strobe is high
        if self.strobe {
            self.index = 0;
        }
    }

    pub fn clear(&mut self) {
        self.buttons = JoypadBtnState::empty();
        self.index = 0;
        self.strobe = false;
    }
}

/// The console-side input ports.
#[derive(Default, Debug, Copy, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Input {
    pub joypads: [Joypad; 2],
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn joypad(&self, player: Player) -> &Joypad {
        &self.joypads[player as usize]
    }

    pub fn joypad_mut(&mut self, player: Player) -> &mut Joypad {
        &mut self.joypads[player as usize]
    }

    /// CPU read of `$4016`/`$4017`. Upper bits reflect open bus.
    pub fn read(&mut self, player: Player, open_bus: u8) -> u8 {
        self.joypads[player as usize].read() | (open_bus & 0xF8) | 0x40
    }

    pub fn peek(&self, player: Player, open_bus: u8) -> u8 {
        self.joypads[player as usize].peek() | (open_bus & 0xF8) | 0x40
    }

    /// CPU write of `$4016` strobes both controllers.
    pub fn write(&mut self, val: u8) {
        for pad in &mut self.joypads {
            pad.write(val);
        }
    }

    pub fn clear(&mut self) {
        for pad in &mut self.joypads {
            pad.clear();
        }
    }
}

impl Reset for Input {
    fn reset(&mut self, _kind: ResetKind) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strobe_latches_and_shifts() {
        let mut joypad = Joypad::default();
        joypad.set_button(JoypadBtn::A, true);
        joypad.set_button(JoypadBtn::Start, true);

        joypad.write(0x01);
        joypad.write(0x00);

        let mut bits = [0u8; 8];
        for bit in &mut bits {
            *bit = joypad.read();
        }
        assert_eq!(bits, [1, 0, 0, 1, 0, 0, 0, 0], "A then Start");
        assert_eq!(joypad.read(), 0x01, "exhausted register reads 1");
    }

    #[test]
    fn strobe_high_repeats_first_bit() {
        let mut joypad = Joypad::default();
        joypad.set_button(JoypadBtn::A, true);
        joypad.write(0x01);
        assert_eq!(joypad.read(), 0x01, "strobed read");
        assert_eq!(joypad.read(), 0x01, "strobe held, no shift");
    }

    #[test]
    fn ports_are_independent() {
        let mut input = Input::new();
        input.joypad_mut(Player::One).set_button(JoypadBtn::A, true);
        input.write(0x01);
        input.write(0x00);
        assert_eq!(input.read(Player::One, 0x00) & 0x01, 0x01, "player one A");
        assert_eq!(input.read(Player::Two, 0x00) & 0x01, 0x00, "player two empty");
    }
}
