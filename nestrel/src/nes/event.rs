//! The typed event bus and its single consumer.
//!
//! Producers are the winit input loop, the scheduler (frames, samples,
//! fatal quits) and anything else holding a sender; the consumer thread
//! processes events strictly in arrival order, forwarding frames to the
//! video sink and recorder, samples to the audio sink and recorder, input
//! into the deck, and pause requests onto the scheduler's pause channel.

use crate::nes::{
    audio::Audio,
    config::Config,
    record::{AudioRecorder, FrameRecorder},
};
use crossbeam::channel::{self, Receiver, Sender};
use nestrel_core::{
    apu::Apu,
    control_deck::{ControlDeck, StepMode},
    input::{JoypadBtn, Player},
};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};
use winit::event_loop::EventLoopProxy;

/// How a pause request changes the scheduler's paused state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum PauseKind {
    Toggle,
    Pause,
    Unpause,
}

/// A pause request with an optional single-shot acknowledgement channel.
/// The acknowledgement carries whether the paused state changed.
#[derive(Debug)]
#[must_use]
pub struct PauseRequest {
    pub kind: PauseKind,
    pub ack: Option<Sender<bool>>,
}

impl PauseRequest {
    pub const fn toggle() -> Self {
        Self {
            kind: PauseKind::Toggle,
            ack: None,
        }
    }

    pub const fn pause() -> Self {
        Self {
            kind: PauseKind::Pause,
            ack: None,
        }
    }

    pub const fn unpause() -> Self {
        Self {
            kind: PauseKind::Unpause,
            ack: None,
        }
    }

    pub fn with_ack(kind: PauseKind, ack: Sender<bool>) -> Self {
        Self {
            kind,
            ack: Some(ack),
        }
    }
}

/// Events processed by the consumer, in strict arrival order.
#[derive(Debug)]
#[must_use]
pub enum EmuEvent {
    /// A completed RGBA frame from the scheduler.
    Frame(Vec<u8>),
    /// One audio sample from the scheduler.
    Sample(i16),
    /// A controller button changed state.
    Joypad(Player, JoypadBtn, bool),
    /// Change the scheduler's paused state.
    Pause(PauseRequest),
    /// Arm a step mode and resume until its boundary.
    Step(StepMode),
    /// Snapshot the engine to the save state file.
    SaveState,
    /// Restore the engine from the save state file.
    LoadState,
    /// Toggle once-a-second FPS logging.
    ShowFps,
    /// Begin teardown of every activity.
    Quit,
}

/// User events delivered to the main-thread winit loop.
#[derive(Debug)]
#[must_use]
pub enum NesEvent {
    /// A frame ready for display.
    Frame(Vec<u8>),
    /// The engine is quitting; exit the event loop.
    Terminate,
}

/// The single event-consumer activity.
#[must_use]
pub struct EventConsumer {
    rx: Receiver<EmuEvent>,
    deck: Arc<Mutex<ControlDeck>>,
    pause_tx: Sender<PauseRequest>,
    quit: Arc<AtomicBool>,
    proxy: EventLoopProxy<NesEvent>,
    audio: Audio,
    frame_recorder: Option<FrameRecorder>,
    audio_recorder: Option<AudioRecorder>,
    show_fps: bool,
    fps_frames: u32,
    fps_timer: Instant,
}

impl EventConsumer {
    const AUDIO_LATENCY: Duration = Duration::from_millis(50);

    /// Spawn the consumer thread, which owns the audio sink and recorders.
    ///
    /// # Errors
    ///
    /// If the thread or a recorder fails to initialize, then an error is
    /// returned.
    pub fn spawn(
        config: &Config,
        rx: Receiver<EmuEvent>,
        deck: Arc<Mutex<ControlDeck>>,
        pause_tx: Sender<PauseRequest>,
        quit: Arc<AtomicBool>,
        proxy: EventLoopProxy<NesEvent>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let sample_rate = Apu::DEFAULT_SAMPLE_RATE as u32;
        let frame_recorder = FrameRecorder::spawn(config.recorder)?;
        let audio_recorder = AudioRecorder::spawn(config.audio_recorder, sample_rate)?;
        let silent = config.silent;
        let show_fps = config.show_fps;
        let handle = std::thread::Builder::new().name("events".into()).spawn(
            move || {
                // The cpal stream must be created on the thread that owns it
                let audio = if silent {
                    Audio::disabled(sample_rate)
                } else {
                    Audio::new(sample_rate, Self::AUDIO_LATENCY)
                };
                let mut consumer = Self {
                    rx,
                    deck,
                    pause_tx,
                    quit,
                    proxy,
                    audio,
                    frame_recorder,
                    audio_recorder,
                    show_fps,
                    fps_frames: 0,
                    fps_timer: Instant::now(),
                };
                consumer.process_events();
            },
        )?;
        Ok(handle)
    }

    /// Process events until a Quit arrives or every producer is gone, then
    /// quiesce the recorders.
    fn process_events(&mut self) {
        while let Ok(event) = self.rx.recv() {
            if self.on_event(event) {
                break;
            }
        }
        if let Some(recorder) = self.frame_recorder.take() {
            recorder.finish();
        }
        if let Some(recorder) = self.audio_recorder.take() {
            recorder.finish();
        }
    }

    /// Handle one event. Returns `true` on Quit.
    fn on_event(&mut self, event: EmuEvent) -> bool {
        match event {
            EmuEvent::Frame(frame) => self.on_frame(frame),
            EmuEvent::Sample(sample) => {
                self.audio.push(sample);
                if let Some(recorder) = &self.audio_recorder {
                    recorder.push(sample);
                }
            }
            EmuEvent::Joypad(player, button, pressed) => {
                self.deck.lock().joypad_mut(player).set_button(button, pressed);
            }
            EmuEvent::Pause(request) => {
                // The scheduler disarms single-stepping when a toggle
                // resumes free-running
                let _ = self.pause_tx.send(request);
            }
            EmuEvent::Step(mode) => {
                self.deck.lock().set_step_mode(mode);
                let _ = self.pause_tx.send(PauseRequest {
                    kind: PauseKind::Unpause,
                    ack: None,
                });
            }
            EmuEvent::SaveState => self.save_state(),
            EmuEvent::LoadState => self.load_state(),
            EmuEvent::ShowFps => {
                self.show_fps = !self.show_fps;
                self.fps_frames = 0;
                self.fps_timer = Instant::now();
            }
            EmuEvent::Quit => {
                self.quit.store(true, Ordering::Relaxed);
                // Unblock a scheduler parked on the pause channel
                let _ = self.pause_tx.send(PauseRequest::unpause());
                let _ = self.proxy.send_event(NesEvent::Terminate);
                return true;
            }
        }
        false
    }

    fn on_frame(&mut self, frame: Vec<u8>) {
        if self.show_fps {
            self.fps_frames += 1;
            let elapsed = self.fps_timer.elapsed();
            if elapsed >= Duration::from_secs(1) {
                info!("fps: {:.1}", f64::from(self.fps_frames) / elapsed.as_secs_f64());
                self.fps_frames = 0;
                self.fps_timer = Instant::now();
            }
        }
        if let Some(recorder) = &self.frame_recorder {
            recorder.push(frame.clone());
        }
        let _ = self.proxy.send_event(NesEvent::Frame(frame));
    }

    /// Run `f` with the scheduler paused, restoring the previous state after.
    ///
    /// Snapshot consistency requires the scheduler to be parked outside an
    /// iteration while the deck is serialized.
    fn with_paused(&mut self, f: impl FnOnce(&mut Self)) {
        let (ack_tx, ack_rx) = channel::bounded(1);
        let _ = self
            .pause_tx
            .send(PauseRequest::with_ack(PauseKind::Pause, ack_tx));
        let changed = match ack_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(changed) => changed,
            Err(err) => {
                warn!("scheduler did not acknowledge pause: {err:?}");
                false
            }
        };
        f(self);
        if changed {
            let _ = self.pause_tx.send(PauseRequest::unpause());
        }
    }

    fn save_state(&mut self) {
        self.with_paused(|consumer| {
            let deck = consumer.deck.lock();
            let Some(path) = deck.save_state_path() else {
                error!("no rom is loaded");
                return;
            };
            match deck.save_state(&path) {
                Ok(()) => info!("state saved"),
                Err(err) => error!("failed to save state: {err}"),
            }
        });
    }

    fn load_state(&mut self) {
        self.with_paused(|consumer| {
            let mut deck = consumer.deck.lock();
            let Some(path) = deck.save_state_path() else {
                error!("no rom is loaded");
                return;
            };
            match deck.load_state(&path) {
                Ok(()) => info!("state loaded"),
                Err(err) => error!("failed to load state: {err}"),
            }
        });
    }
}
