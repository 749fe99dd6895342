use clap::{Parser, ValueEnum};
use nestrel::nes::config::{AudioRecorderKind, Config, FrameRecorderKind};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub(crate) struct NesRegion(nestrel_core::common::NesRegion);

impl ValueEnum for NesRegion {
    fn value_variants<'a>() -> &'a [Self] {
        use nestrel_core::common::NesRegion::*;
        &[Self(Auto), Self(Ntsc), Self(Pal)]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.0.as_str()))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RamState(nestrel_core::mem::RamState);

impl ValueEnum for RamState {
    fn value_variants<'a>() -> &'a [Self] {
        use nestrel_core::mem::RamState::*;
        &[Self(AllZeros), Self(AllOnes), Self(Random)]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.0.as_str()))
    }
}

/// nestrel CLI options.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
#[must_use]
pub(crate) struct Opts {
    /// The NES ROM to load.
    pub(crate) path: PathBuf,
    /// Choose NES region. [default: "auto"]
    #[arg(short, long, value_enum)]
    pub(crate) region: Option<NesRegion>,
    /// Choose power-up RAM state. [default: "all-zeros"]
    #[arg(short = 'm', long, value_enum)]
    pub(crate) ram_state: Option<RamState>,
    /// Record video frames. [default: "none"]
    #[arg(long, value_enum)]
    pub(crate) recorder: Option<FrameRecorderKind>,
    /// Record audio. [default: "none"]
    #[arg(long, value_enum)]
    pub(crate) audio_recorder: Option<AudioRecorderKind>,
    /// Log each executed CPU instruction.
    #[arg(short, long)]
    pub(crate) decode: bool,
    /// Silence audio.
    #[arg(short, long)]
    pub(crate) silent: bool,
    /// Log frames-per-second once a second.
    #[arg(long)]
    pub(crate) show_fps: bool,
    /// Window scale.
    #[arg(long)]
    pub(crate) scale: Option<u32>,
    /// Emulation speed. [default: 1.0]
    #[arg(short = 'x', long)]
    pub(crate) speed: Option<f32>,
    /// Custom config path.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
}

impl Opts {
    /// Loads the base `Config`, merging it with CLI options.
    pub(crate) fn load(self) -> anyhow::Result<(Config, PathBuf)> {
        let mut cfg = Config::load(self.config.clone());

        if let Some(NesRegion(region)) = self.region {
            cfg.deck.region = region;
        }
        if let Some(RamState(ram_state)) = self.ram_state {
            cfg.deck.ram_state = ram_state;
        }
        if let Some(recorder) = self.recorder {
            cfg.recorder = recorder;
        }
        if let Some(audio_recorder) = self.audio_recorder {
            cfg.audio_recorder = audio_recorder;
        }
        cfg.trace_cpu = self.decode || cfg.trace_cpu;
        cfg.silent = self.silent || cfg.silent;
        cfg.show_fps = self.show_fps || cfg.show_fps;
        if let Some(scale) = self.scale {
            cfg.scale = scale.clamp(1, 8);
        }
        if let Some(speed) = self.speed {
            cfg.speed = speed.clamp(0.25, 4.0);
        }

        Ok((cfg, self.path))
    }
}
