//! Common traits and constants.

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[must_use]
#[error("failed to parse `NesRegion`")]
pub struct ParseNesRegionError;

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum NesRegion {
    Auto,
    #[default]
    Ntsc,
    Pal,
}

impl NesRegion {
    pub const fn as_slice() -> &'static [Self] {
        &[NesRegion::Auto, NesRegion::Ntsc, NesRegion::Pal]
    }

    #[must_use]
    pub fn is_auto(&self) -> bool {
        self == &Self::Auto
    }

    #[must_use]
    pub const fn is_ntsc(&self) -> bool {
        matches!(self, Self::Auto | Self::Ntsc)
    }

    #[must_use]
    pub fn is_pal(&self) -> bool {
        self == &Self::Pal
    }

    /// PPU cycles owed per CPU cycle, as an exact `(numerator, denominator)`
    /// rational. NTSC runs the PPU at 3x the CPU clock, PAL at 3.2x (16/5).
    #[must_use]
    pub const fn ppu_divisor(&self) -> (u64, u64) {
        match self {
            Self::Auto | Self::Ntsc => (3, 1),
            Self::Pal => (16, 5),
        }
    }

    /// CPU clock rate in Hz.
    #[must_use]
    pub const fn cpu_clock_rate(&self) -> u64 {
        match self {
            Self::Auto | Self::Ntsc => 1_789_773,
            Self::Pal => 1_662_607,
        }
    }

    /// Target frame rate in Hz.
    #[must_use]
    pub const fn frame_rate(&self) -> f64 {
        match self {
            Self::Auto | Self::Ntsc => 60.0988,
            Self::Pal => 50.007,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Ntsc => "ntsc",
            Self::Pal => "pal",
        }
    }
}

impl std::fmt::Display for NesRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auto => "Auto",
            Self::Ntsc => "NTSC",
            Self::Pal => "PAL",
        };
        write!(f, "{s}")
    }
}

impl AsRef<str> for NesRegion {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for NesRegion {
    type Error = ParseNesRegionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "auto" => Ok(Self::Auto),
            "ntsc" => Ok(Self::Ntsc),
            "pal" => Ok(Self::Pal),
            _ => Err(ParseNesRegionError),
        }
    }
}

/// Trait for types that have different behavior depending on NES region.
#[enum_dispatch(Mapper)]
pub trait Regional {
    fn region(&self) -> NesRegion {
        NesRegion::Ntsc
    }
    fn set_region(&mut self, _region: NesRegion) {}
}

/// Type of reset for types that have different behavior for reset vs power cycling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum ResetKind {
    Soft,
    Hard,
}

/// Trait for types that can be reset.
#[enum_dispatch(Mapper)]
pub trait Reset {
    fn reset(&mut self, _kind: ResetKind) {}
}

/// Trait for types clocked once per CPU cycle.
pub trait Clock {
    fn clock(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppu_divisor_exact() {
        let (num, den) = NesRegion::Ntsc.ppu_divisor();
        assert_eq!((num, den), (3, 1), "ntsc divisor");
        let (num, den) = NesRegion::Pal.ppu_divisor();
        assert_eq!((num, den), (16, 5), "pal divisor");
        // 16/5 is exactly the documented 3.2 ratio
        assert!((num as f64 / den as f64 - 3.2).abs() < f64::EPSILON);
    }

    #[test]
    fn region_parsing() {
        assert_eq!(NesRegion::try_from("pal").unwrap(), NesRegion::Pal);
        assert_eq!(NesRegion::try_from("ntsc").unwrap(), NesRegion::Ntsc);
        assert!(NesRegion::try_from("dendy").is_err());
    }
}
