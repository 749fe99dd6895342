//! Audio sink: a cpal output stream fed from a lock-free sample ring.

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{consumer::Consumer, producer::Producer, HeapRb};
use std::{iter, sync::Arc, time::Duration};
use tracing::{debug, error, warn};

type AudioRb = Arc<HeapRb<i16>>;

/// Audio output sink consuming the engine's 16-bit sample stream.
///
/// Construction failures leave a disabled sink: emulation continues without
/// sound rather than failing to start.
#[must_use]
pub struct Audio {
    pub sample_rate: u32,
    producer: Option<Producer<i16, AudioRb>>,
    _stream: Option<cpal::Stream>,
}

impl std::fmt::Debug for Audio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audio")
            .field("sample_rate", &self.sample_rate)
            .field("enabled", &self.enabled())
            .finish_non_exhaustive()
    }
}

impl Audio {
    /// Create and start an audio output sink.
    pub fn new(sample_rate: u32, latency: Duration) -> Self {
        match Self::start(sample_rate, latency) {
            Ok((producer, stream)) => Self {
                sample_rate,
                producer: Some(producer),
                _stream: Some(stream),
            },
            Err(err) => {
                warn!("audio disabled: {err:?}");
                Self {
                    sample_rate,
                    producer: None,
                    _stream: None,
                }
            }
        }
    }

    /// Create a disabled sink that discards samples.
    pub const fn disabled(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            producer: None,
            _stream: None,
        }
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.producer.is_some()
    }

    /// Queue one sample for playback. Drops samples when the ring is full
    /// (the device will catch up).
    pub fn push(&mut self, sample: i16) {
        if let Some(producer) = &mut self.producer {
            let _ = producer.push(sample);
        }
    }

    fn start(
        sample_rate: u32,
        latency: Duration,
    ) -> anyhow::Result<(Producer<i16, AudioRb>, cpal::Stream)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no available audio devices found"))?;
        debug!(
            "audio device: {}",
            device.name().as_deref().unwrap_or("unknown")
        );

        let supported = device
            .default_output_config()
            .context("failed to get default output config")?;
        let sample_format = supported.sample_format();
        let mut config = cpal::StreamConfig::from(supported);
        config.sample_rate = cpal::SampleRate(sample_rate);

        let sample_latency = (latency.as_secs_f32()
            * sample_rate as f32
            * f32::from(config.channels))
        .ceil() as usize;
        let buffer = HeapRb::<i16>::new(2 * sample_latency.max(512));
        let (producer, consumer) = buffer.split();

        use cpal::SampleFormat;
        let stream = match sample_format {
            SampleFormat::I16 => Self::make_stream::<i16>(&device, &config, consumer),
            SampleFormat::I32 => Self::make_stream::<i32>(&device, &config, consumer),
            SampleFormat::F32 => Self::make_stream::<f32>(&device, &config, consumer),
            SampleFormat::F64 => Self::make_stream::<f64>(&device, &config, consumer),
            SampleFormat::U16 => Self::make_stream::<u16>(&device, &config, consumer),
            sample_format => Err(anyhow!("unsupported sample format {sample_format}")),
        }?;
        stream.play().context("failed to start audio stream")?;

        Ok((producer, stream))
    }

    fn make_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut consumer: Consumer<i16, AudioRb>,
    ) -> anyhow::Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<i16>,
    {
        let channels = usize::from(config.channels);
        Ok(device.build_output_stream(
            config,
            move |out: &mut [T], _info| {
                // Mono engine output duplicated across device channels;
                // underruns are padded with silence
                let mut samples = consumer.pop_iter().chain(iter::repeat(0i16));
                for frame in out.chunks_mut(channels) {
                    let sample = samples.next().unwrap_or(0);
                    for channel in frame {
                        *channel = T::from_sample(sample);
                    }
                }
            },
            |err| error!("an error occurred on the audio stream: {err}"),
            None,
        )?)
    }
}
