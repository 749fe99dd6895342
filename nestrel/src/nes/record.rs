//! Frame and audio recorders, each running as a detached sink activity.
//!
//! Recorder write failures are logged and never halt emulation.

use crate::nes::config::{AudioRecorderKind, FrameRecorderKind};
use anyhow::Context;
use chrono::Local;
use crossbeam::channel::{self, Receiver, Sender};
use image::{codecs::gif, Delay, RgbaImage};
use nestrel_core::ppu::Ppu;
use std::{
    fs::File,
    io::BufWriter,
    path::PathBuf,
    thread::JoinHandle,
};
use tracing::{error, info};

/// Video frame recorder: JPEG-per-frame or a single animated GIF.
#[derive(Debug)]
#[must_use]
pub struct FrameRecorder {
    tx: Sender<Vec<u8>>,
    handle: JoinHandle<()>,
}

impl FrameRecorder {
    /// Spawn a recorder thread for the chosen backend. Returns `None` for
    /// [`FrameRecorderKind::None`].
    pub fn spawn(kind: FrameRecorderKind) -> anyhow::Result<Option<Self>> {
        let stamp = Local::now().format("%Y-%m-%d_at_%H_%M_%S");
        let (tx, rx) = channel::unbounded::<Vec<u8>>();
        let handle = match kind {
            FrameRecorderKind::None => return Ok(None),
            FrameRecorderKind::Jpeg => {
                let dir = PathBuf::from(format!("frames_{stamp}"));
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create frame dir {dir:?}"))?;
                info!("recording JPEG frames to {dir:?}");
                std::thread::Builder::new()
                    .name("jpeg-recorder".into())
                    .spawn(move || Self::record_jpeg(&rx, &dir))?
            }
            FrameRecorderKind::Gif => {
                let path = PathBuf::from(format!("recording_{stamp}.gif"));
                let file = File::create(&path)
                    .with_context(|| format!("failed to create {path:?}"))?;
                info!("recording GIF to {path:?}");
                std::thread::Builder::new()
                    .name("gif-recorder".into())
                    .spawn(move || Self::record_gif(&rx, file))?
            }
        };
        Ok(Some(Self { tx, handle }))
    }

    /// Queue an RGBA frame for encoding.
    pub fn push(&self, frame: Vec<u8>) {
        let _ = self.tx.send(frame);
    }

    /// Stop recording and wait for queued frames to be written.
    pub fn finish(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            error!("frame recorder thread panicked");
        }
    }

    fn record_jpeg(rx: &Receiver<Vec<u8>>, dir: &PathBuf) {
        let mut frame_number = 0u32;
        while let Ok(frame) = rx.recv() {
            frame_number += 1;
            let path = dir.join(format!("frame_{frame_number:06}.jpg"));
            // JPEG has no alpha channel
            let rgb: Vec<u8> = frame
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let result = File::create(&path).map_err(anyhow::Error::from).and_then(|file| {
                let mut encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(BufWriter::new(file), 90);
                encoder
                    .encode(&rgb, Ppu::WIDTH, Ppu::HEIGHT, image::ExtendedColorType::Rgb8)
                    .map_err(Into::into)
            });
            if let Err(err) = result {
                error!("failed to record frame {frame_number}: {err:?}");
            }
        }
    }

    fn record_gif(rx: &Receiver<Vec<u8>>, file: File) {
        let mut encoder = gif::GifEncoder::new(BufWriter::new(file));
        if let Err(err) = encoder.set_repeat(gif::Repeat::Infinite) {
            error!("failed to start gif recording: {err:?}");
            return;
        }
        while let Ok(frame) = rx.recv() {
            let Some(image) = RgbaImage::from_raw(Ppu::WIDTH, Ppu::HEIGHT, frame) else {
                error!("dropped malformed frame");
                continue;
            };
            let frame = image::Frame::from_parts(
                image,
                0,
                0,
                Delay::from_numer_denom_ms(1000, 60),
            );
            if let Err(err) = encoder.encode_frame(frame) {
                error!("failed to record gif frame: {err:?}");
            }
        }
    }
}

/// Audio recorder writing the sample stream to a WAV file.
#[derive(Debug)]
#[must_use]
pub struct AudioRecorder {
    tx: Sender<i16>,
    handle: JoinHandle<()>,
}

impl AudioRecorder {
    /// Spawn a recorder thread for the chosen backend. Returns `None` for
    /// [`AudioRecorderKind::None`].
    pub fn spawn(kind: AudioRecorderKind, sample_rate: u32) -> anyhow::Result<Option<Self>> {
        if kind == AudioRecorderKind::None {
            return Ok(None);
        }
        let stamp = Local::now().format("%Y-%m-%d_at_%H_%M_%S");
        let path = PathBuf::from(format!("recording_{stamp}.wav"));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("failed to create {path:?}"))?;
        info!("recording WAV to {path:?}");
        let (tx, rx) = channel::unbounded::<i16>();
        let handle = std::thread::Builder::new()
            .name("wav-recorder".into())
            .spawn(move || Self::record(&rx, writer))?;
        Ok(Some(Self { tx, handle }))
    }

    /// Queue a sample for writing.
    pub fn push(&self, sample: i16) {
        let _ = self.tx.send(sample);
    }

    /// Stop recording and finalize the WAV header.
    pub fn finish(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            error!("audio recorder thread panicked");
        }
    }

    fn record(rx: &Receiver<i16>, mut writer: hound::WavWriter<BufWriter<File>>) {
        while let Ok(sample) = rx.recv() {
            if let Err(err) = writer.write_sample(sample) {
                error!("failed to record audio sample: {err:?}");
                break;
            }
        }
        if let Err(err) = writer.finalize() {
            error!("failed to finalize audio recording: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_recorders_spawn_nothing() {
        assert!(
            FrameRecorder::spawn(FrameRecorderKind::None)
                .expect("spawn")
                .is_none(),
            "no frame recorder"
        );
        assert!(
            AudioRecorder::spawn(AudioRecorderKind::None, 44_100)
                .expect("spawn")
                .is_none(),
            "no audio recorder"
        );
    }
}
