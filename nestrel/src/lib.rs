//! Desktop frontend for the nestrel NES emulator: window, audio, recorders
//! and the threads that drive the emulation core.

pub mod logging;
pub mod nes;
