//! Frontend configuration, merged from the config file and CLI options.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::{error, info};

/// Video frame recorder backend.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FrameRecorderKind {
    #[default]
    None,
    /// One JPEG image per frame.
    Jpeg,
    /// A single animated GIF.
    Gif,
}

/// Audio recorder backend.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioRecorderKind {
    #[default]
    None,
    Wav,
}

/// Frontend configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[must_use]
pub struct Config {
    /// Emulation core settings.
    pub deck: nestrel_core::control_deck::Config,
    /// Window scale factor.
    pub scale: u32,
    /// Disable audio output.
    pub silent: bool,
    /// Emulation speed multiplier.
    pub speed: f32,
    /// Video frame recorder backend.
    pub recorder: FrameRecorderKind,
    /// Audio recorder backend.
    pub audio_recorder: AudioRecorderKind,
    /// Log each executed CPU instruction.
    pub trace_cpu: bool,
    /// Log frames-per-second once a second.
    pub show_fps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deck: nestrel_core::control_deck::Config::default(),
            scale: 3,
            silent: false,
            speed: 1.0,
            recorder: FrameRecorderKind::default(),
            audio_recorder: AudioRecorderKind::default(),
            trace_cpu: false,
            show_fps: false,
        }
    }
}

impl Config {
    pub const WINDOW_TITLE: &'static str = "nestrel";
    const FILENAME: &'static str = "config.json";

    /// Returns the default configuration file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_local_dir()
            .map_or_else(|| PathBuf::from("config"), |dir| dir.join("nestrel"))
            .join(Self::FILENAME)
    }

    /// Load configuration from `path`, falling back to defaults on any error.
    pub fn load(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(Self::default_path);
        if !path.is_file() {
            return Self::default();
        }
        File::open(&path)
            .map_err(anyhow::Error::from)
            .and_then(|file| serde_json::from_reader(file).map_err(Into::into))
            .unwrap_or_else(|err| {
                error!("failed to load config {path:?}: {err:?}");
                Self::default()
            })
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// If the file cannot be created or serialized, then an error is returned.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {parent:?}"))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create config file {path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .context("failed to serialize config")?;
        info!("saved configuration to {path:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "nestrel-config-{}-roundtrip.json",
            std::process::id()
        ));
        let config = Config {
            scale: 2,
            silent: true,
            show_fps: true,
            ..Config::default()
        };
        config.save(&path).expect("save config");
        let loaded = Config::load(Some(path.clone()));
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config, "config round trip");
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let loaded = Config::load(Some(PathBuf::from("/nonexistent/nestrel.json")));
        assert_eq!(loaded, Config::default(), "defaults on missing file");
    }
}
