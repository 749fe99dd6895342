//! The nestrel application: lifecycle, wiring and the main-thread video sink.
//!
//! `Nes::run` builds the deck, spawns the scheduler and event-consumer
//! activities, then runs the winit loop on the calling thread, which owns the
//! window and must not migrate. Teardown is cooperative through the quit
//! latch; every activity observes it at its next checkpoint.

use crate::nes::{
    config::Config,
    emulation::Emulation,
    event::{EmuEvent, EventConsumer, NesEvent, PauseRequest},
    renderer::Renderer,
};
use anyhow::Context;
use crossbeam::channel::{self, Sender};
use nestrel_core::{
    common::Regional,
    control_deck::{ControlDeck, StepMode},
    input::{JoypadBtn, Player},
};
use parking_lot::Mutex;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};
use tracing::{error, info};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowId,
};

pub mod audio;
pub mod config;
pub mod emulation;
pub mod event;
pub mod record;
pub mod renderer;

/// Represents all the NES emulation state.
#[must_use]
pub struct Nes {
    deck: Arc<Mutex<ControlDeck>>,
    event_tx: Sender<EmuEvent>,
    renderer: Renderer,
    emulation: Option<Emulation>,
    consumer: Option<JoinHandle<()>>,
    quit: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

impl Nes {
    /// Begins emulation by starting the engine activities and the window
    /// event loop.
    ///
    /// # Errors
    ///
    /// If the ROM fails to load or any activity fails to start, then an
    /// error is returned.
    pub fn run(config: Config, rom_path: PathBuf) -> anyhow::Result<()> {
        let event_loop = EventLoop::<NesEvent>::with_user_event()
            .build()
            .context("failed to build event loop")?;
        event_loop.set_control_flow(ControlFlow::Wait);
        let mut nes = Nes::new(config, rom_path, &event_loop)?;
        event_loop.run_app(&mut nes).context("event loop failed")?;
        nes.shutdown()
    }

    fn new(config: Config, rom_path: PathBuf, event_loop: &EventLoop<NesEvent>) -> anyhow::Result<Self> {
        let mut deck = ControlDeck::with_config(config.deck.clone());
        deck.set_trace_instrs(config.trace_cpu);
        let loaded = deck.load_rom_path(&rom_path)?;
        info!("running {} ({})", loaded.name, loaded.region);

        let region = deck.region();
        let frame_duration =
            Duration::from_secs_f64(1.0 / (region.frame_rate() * f64::from(config.speed)));

        let deck = Arc::new(Mutex::new(deck));
        let (event_tx, event_rx) = channel::unbounded();
        let (pause_tx, pause_rx) = channel::unbounded();
        let quit = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let consumer = EventConsumer::spawn(
            &config,
            event_rx,
            Arc::clone(&deck),
            pause_tx,
            Arc::clone(&quit),
            event_loop.create_proxy(),
        )?;
        let emulation = Emulation::spawn(
            Arc::clone(&deck),
            pause_rx,
            event_tx.clone(),
            Arc::clone(&quit),
            Arc::clone(&failed),
            frame_duration,
        )?;

        Ok(Self {
            deck,
            event_tx,
            renderer: Renderer::new(config.scale),
            emulation: Some(emulation),
            consumer: Some(consumer),
            quit,
            failed,
        })
    }

    /// Post an event onto the event bus.
    fn post(&self, event: EmuEvent) {
        if self.event_tx.send(event).is_err() {
            error!("event consumer is gone");
        }
    }

    /// Quiesce all activities and write battery-backed RAM.
    fn shutdown(mut self) -> anyhow::Result<()> {
        self.quit.store(true, Ordering::Relaxed);
        // The consumer may already be gone if a Quit event started teardown
        let _ = self.event_tx.send(EmuEvent::Quit);
        if let Some(emulation) = self.emulation.take() {
            emulation.join();
        }
        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                error!("event consumer thread panicked");
            }
        }
        self.deck
            .lock()
            .unload_rom()
            .context("failed to unload rom")?;
        if self.failed.load(Ordering::Relaxed) {
            anyhow::bail!("emulation terminated with a fatal error");
        }
        info!("shutdown complete");
        Ok(())
    }

    fn on_key(&mut self, key: KeyCode, pressed: bool) {
        // Player one on the standard controller layout
        let joypad = match key {
            KeyCode::ArrowLeft => Some(JoypadBtn::Left),
            KeyCode::ArrowRight => Some(JoypadBtn::Right),
            KeyCode::ArrowUp => Some(JoypadBtn::Up),
            KeyCode::ArrowDown => Some(JoypadBtn::Down),
            KeyCode::KeyZ => Some(JoypadBtn::A),
            KeyCode::KeyX => Some(JoypadBtn::B),
            KeyCode::Enter => Some(JoypadBtn::Start),
            KeyCode::ShiftRight => Some(JoypadBtn::Select),
            _ => None,
        };
        if let Some(button) = joypad {
            self.post(EmuEvent::Joypad(Player::One, button, pressed));
            return;
        }

        if !pressed {
            return;
        }
        match key {
            KeyCode::Escape => self.post(EmuEvent::Pause(PauseRequest::toggle())),
            KeyCode::KeyQ => self.post(EmuEvent::Quit),
            KeyCode::F1 => self.post(EmuEvent::SaveState),
            KeyCode::F2 => self.post(EmuEvent::LoadState),
            KeyCode::F3 => self.post(EmuEvent::ShowFps),
            KeyCode::KeyC => self.post(EmuEvent::Step(StepMode::Cycle)),
            KeyCode::KeyL => self.post(EmuEvent::Step(StepMode::Scanline)),
            KeyCode::KeyF => self.post(EmuEvent::Step(StepMode::Frame)),
            _ => (),
        }
    }
}

impl ApplicationHandler<NesEvent> for Nes {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.resume(event_loop) {
            error!("failed to initialize renderer: {err:?}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.post(EmuEvent::Quit);
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.renderer.render() {
                    error!("render error: {err:?}");
                    self.post(EmuEvent::Quit);
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => self.on_key(key, state == ElementState::Pressed),
            _ => (),
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: NesEvent) {
        match event {
            NesEvent::Frame(frame) => self.renderer.on_frame(&frame),
            NesEvent::Terminate => event_loop.exit(),
        }
    }
}
