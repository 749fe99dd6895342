//! The emulation scheduler activity.
//!
//! A dedicated thread drives [`ControlDeck::clock_step`] in a tight loop,
//! pacing to the region frame rate, publishing frame and sample events, and
//! honoring pause requests. While paused the thread blocks on the pause
//! channel alone; a quit while paused is unblocked by the request the event
//! consumer sends after setting the quit latch.

use crate::nes::event::{EmuEvent, PauseKind, PauseRequest};
use crossbeam::channel::{Receiver, Sender};
use nestrel_core::control_deck::{ControlDeck, StepMode};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, error};

/// Applies one pause request, acknowledging whether the state changed.
fn apply_pause(paused: bool, request: PauseRequest) -> bool {
    let new_paused = match request.kind {
        PauseKind::Pause => true,
        PauseKind::Unpause => false,
        PauseKind::Toggle => !paused,
    };
    if let Some(ack) = request.ack {
        let _ = ack.send(new_paused != paused);
    }
    new_paused
}

/// Sleeps out the remainder of each frame to hold the target frame rate.
#[derive(Debug)]
#[must_use]
pub struct FrameTiming {
    target: Duration,
    next_frame: Instant,
}

impl FrameTiming {
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            next_frame: Instant::now() + target,
        }
    }

    /// Block until the next frame deadline.
    pub fn delay(&mut self) {
        let now = Instant::now();
        if let Some(timeout) = self.next_frame.checked_duration_since(now) {
            std::thread::park_timeout(timeout);
            self.next_frame += self.target;
        } else {
            // Too far behind to catch up; rebase instead of bursting frames
            self.next_frame = now + self.target;
        }
    }
}

/// Handle to the scheduler thread.
#[derive(Debug)]
#[must_use]
pub struct Emulation {
    handle: JoinHandle<()>,
}

impl Emulation {
    /// Spawn the scheduler thread.
    ///
    /// # Errors
    ///
    /// If the thread fails to spawn, then an error is returned.
    pub fn spawn(
        deck: Arc<Mutex<ControlDeck>>,
        pause_rx: Receiver<PauseRequest>,
        event_tx: Sender<EmuEvent>,
        quit: Arc<AtomicBool>,
        failed: Arc<AtomicBool>,
        frame_duration: Duration,
    ) -> anyhow::Result<Self> {
        let handle = std::thread::Builder::new().name("emulation".into()).spawn(
            move || {
                let mut machine = Machine {
                    deck,
                    pause_rx,
                    event_tx,
                    quit,
                    failed,
                    paused: false,
                    timing: FrameTiming::new(frame_duration),
                };
                machine.run();
            },
        )?;
        Ok(Self { handle })
    }

    /// Wait for the scheduler thread to exit.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("emulation thread panicked");
        }
    }
}

struct Machine {
    deck: Arc<Mutex<ControlDeck>>,
    pause_rx: Receiver<PauseRequest>,
    event_tx: Sender<EmuEvent>,
    quit: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    paused: bool,
    timing: FrameTiming,
}

impl Machine {
    fn run(&mut self) {
        debug!("emulation thread started");
        loop {
            #[cfg(feature = "profiling")]
            puffin::profile_scope!("emulation loop");

            if self.quit.load(Ordering::Relaxed) {
                break;
            }

            // While paused, the only wakeup is another pause request (or the
            // channel closing on teardown)
            if self.paused {
                match self.pause_rx.recv() {
                    Ok(request) => {
                        self.on_pause_request(request);
                        continue;
                    }
                    Err(_) => break,
                }
            }
            while let Ok(request) = self.pause_rx.try_recv() {
                self.on_pause_request(request);
            }
            if self.paused {
                continue;
            }

            let outcome = self.deck.lock().clock_step();
            match outcome {
                Ok(outcome) => {
                    if let Some(frame) = outcome.frame {
                        let _ = self.event_tx.send(EmuEvent::Frame(frame));
                        self.timing.delay();
                    }
                    for sample in outcome.samples {
                        let _ = self.event_tx.send(EmuEvent::Sample(sample));
                    }
                    if outcome.pause {
                        self.paused = true;
                    }
                }
                Err(err) => {
                    error!("fatal emulation error: {err}");
                    self.failed.store(true, Ordering::Relaxed);
                    self.quit.store(true, Ordering::Relaxed);
                    let _ = self.event_tx.send(EmuEvent::Quit);
                    break;
                }
            }
        }
        debug!("emulation thread exited");
    }

    fn on_pause_request(&mut self, request: PauseRequest) {
        let kind = request.kind;
        self.paused = apply_pause(self.paused, request);
        // A toggle back to free-running disarms any armed step mode; the
        // Unpause sentinels from Step events and snapshot restores keep it
        if kind == PauseKind::Toggle && !self.paused {
            self.deck.lock().set_step_mode(StepMode::None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use nestrel_core::control_deck::Config;
    use nestrel_core::mem::RamState;

    fn build_rom() -> Vec<u8> {
        let mut rom = vec![
            0x4E, 0x45, 0x53, 0x1A, // NES\x1a
            0x01, 0x01, // 16K PRG, 8K CHR
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut prg = vec![0x00; 0x4000];
        // NOP; JMP $8000
        prg[..4].copy_from_slice(&[0xEA, 0x4C, 0x00, 0x80]);
        prg[0x3FFC] = 0x00;
        prg[0x3FFD] = 0x80;
        rom.extend(prg);
        rom.extend(vec![0x00; 0x2000]);
        rom
    }

    fn test_deck() -> Arc<Mutex<ControlDeck>> {
        let mut deck = ControlDeck::with_config(Config {
            ram_state: RamState::AllZeros,
            ..Config::default()
        });
        let rom = build_rom();
        deck.load_rom("emulation_test", &mut rom.as_slice())
            .expect("valid rom");
        Arc::new(Mutex::new(deck))
    }

    fn cpu_cycle(deck: &Arc<Mutex<ControlDeck>>) -> u64 {
        deck.lock().cpu().cycle
    }

    #[test]
    fn pause_transition_table() {
        // Pause/Unpause force the state; Toggle flips it
        assert!(apply_pause(false, PauseRequest::pause()), "pause from running");
        assert!(apply_pause(true, PauseRequest::pause()), "pause is idempotent");
        assert!(!apply_pause(true, PauseRequest::unpause()), "unpause");
        assert!(!apply_pause(false, PauseRequest::unpause()), "unpause idempotent");
        assert!(apply_pause(false, PauseRequest::toggle()), "toggle on");
        assert!(!apply_pause(true, PauseRequest::toggle()), "toggle off");
    }

    #[test]
    fn toggle_parity_matches_request_history() {
        let mut paused = false;
        for count in 1..=8 {
            paused = apply_pause(paused, PauseRequest::toggle());
            assert_eq!(paused, count % 2 == 1, "parity after {count} toggles");
        }
        paused = apply_pause(paused, PauseRequest::pause());
        assert!(paused, "explicit pause overrides parity");
        paused = apply_pause(paused, PauseRequest::toggle());
        assert!(!paused, "toggle resumes from latest explicit state");
    }

    #[test]
    fn ack_reports_whether_state_changed() {
        let (ack_tx, ack_rx) = channel::bounded(1);
        apply_pause(false, PauseRequest::with_ack(PauseKind::Pause, ack_tx));
        assert_eq!(ack_rx.recv(), Ok(true), "running -> paused changed");

        let (ack_tx, ack_rx) = channel::bounded(1);
        apply_pause(true, PauseRequest::with_ack(PauseKind::Pause, ack_tx));
        assert_eq!(ack_rx.recv(), Ok(false), "paused -> paused unchanged");
    }

    #[test]
    fn pause_stops_the_clock_and_unpause_resumes() {
        let deck = test_deck();
        let (pause_tx, pause_rx) = channel::unbounded();
        let (event_tx, event_rx) = channel::unbounded();
        let quit = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let emulation = Emulation::spawn(
            deck.clone(),
            pause_rx,
            event_tx,
            quit.clone(),
            failed,
            Duration::from_millis(1),
        )
        .expect("spawn");
        // Drain events so the scheduler never blocks on a full channel
        let drain = std::thread::spawn(move || while event_rx.recv().is_ok() {});

        // Pause and verify the clock is frozen
        let (ack_tx, ack_rx) = channel::bounded(1);
        pause_tx
            .send(PauseRequest::with_ack(PauseKind::Pause, ack_tx))
            .expect("send pause");
        assert_eq!(ack_rx.recv(), Ok(true), "pause acknowledged");
        let frozen = cpu_cycle(&deck);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cpu_cycle(&deck), frozen, "no cycles while paused");

        // Unpause and verify the clock advances again
        let (ack_tx, ack_rx) = channel::bounded(1);
        pause_tx
            .send(PauseRequest::with_ack(PauseKind::Unpause, ack_tx))
            .expect("send unpause");
        assert_eq!(ack_rx.recv(), Ok(true), "unpause acknowledged");
        std::thread::sleep(Duration::from_millis(50));
        assert!(cpu_cycle(&deck) > frozen, "cycles advance after unpause");

        quit.store(true, Ordering::Relaxed);
        pause_tx.send(PauseRequest::unpause()).expect("wake for quit");
        emulation.join();
        drop(pause_tx);
        drain.join().expect("drain");
    }

    #[test]
    fn step_then_toggle_resumes_free_running() {
        let deck = test_deck();
        // Arm single-stepping the way a Step event does
        deck.lock().set_step_mode(StepMode::Frame);
        let (pause_tx, pause_rx) = channel::unbounded();
        let (event_tx, event_rx) = channel::unbounded();
        let quit = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let emulation = Emulation::spawn(
            deck.clone(),
            pause_rx,
            event_tx,
            quit.clone(),
            failed,
            Duration::from_millis(1),
        )
        .expect("spawn");
        let drain = std::thread::spawn(move || while event_rx.recv().is_ok() {});

        // The scheduler pauses itself at the first frame boundary
        let mut frozen = None;
        for _ in 0..200 {
            let cycle = cpu_cycle(&deck);
            std::thread::sleep(Duration::from_millis(10));
            if cpu_cycle(&deck) == cycle {
                frozen = Some(cycle);
                break;
            }
        }
        assert!(frozen.is_some(), "scheduler paused at the frame boundary");
        let frames_at_pause = deck.lock().frame_number();

        // An Escape-style toggle resumes free-running play
        pause_tx.send(PauseRequest::toggle()).expect("send toggle");
        let mut resumed = false;
        for _ in 0..500 {
            std::thread::sleep(Duration::from_millis(10));
            // Crossing several frame boundaries proves the step mode no
            // longer re-pauses the clock
            if deck.lock().frame_number() >= frames_at_pause + 3 {
                resumed = true;
                break;
            }
        }
        assert!(resumed, "clock runs past further frame boundaries");
        assert_eq!(
            deck.lock().step_mode(),
            StepMode::None,
            "toggle back to free-running disarmed the step mode"
        );

        quit.store(true, Ordering::Relaxed);
        pause_tx.send(PauseRequest::unpause()).expect("wake for quit");
        emulation.join();
        drop(pause_tx);
        drain.join().expect("drain");
    }

    #[test]
    fn quit_while_paused_unblocks() {
        let deck = test_deck();
        let (pause_tx, pause_rx) = channel::unbounded();
        let (event_tx, _event_rx) = channel::unbounded();
        let quit = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let emulation = Emulation::spawn(
            deck,
            pause_rx,
            event_tx,
            quit.clone(),
            failed,
            Duration::from_millis(1),
        )
        .expect("spawn");

        pause_tx.send(PauseRequest::pause()).expect("send pause");
        std::thread::sleep(Duration::from_millis(20));

        // Quit is observed after the sentinel delivery unblocks the pause read
        quit.store(true, Ordering::Relaxed);
        pause_tx.send(PauseRequest::unpause()).expect("send sentinel");
        emulation.join();
    }

    #[test]
    fn fatal_error_publishes_quit() {
        // A jam opcode makes the scheduler exit with a Quit event
        let mut rom = build_rom();
        rom[16] = 0x02; // jam as the first instruction
        let mut deck = ControlDeck::with_config(Config {
            ram_state: RamState::AllZeros,
            ..Config::default()
        });
        deck.load_rom("fatal_test", &mut rom.as_slice())
            .expect("valid rom");
        let deck = Arc::new(Mutex::new(deck));

        let (_pause_tx, pause_rx) = channel::unbounded();
        let (event_tx, event_rx) = channel::unbounded();
        let quit = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let emulation = Emulation::spawn(
            deck,
            pause_rx,
            event_tx,
            quit.clone(),
            failed.clone(),
            Duration::from_millis(1),
        )
        .expect("spawn");
        emulation.join();

        assert!(quit.load(Ordering::Relaxed), "quit latch set");
        assert!(failed.load(Ordering::Relaxed), "failure latch set");
        let mut saw_quit = false;
        while let Ok(event) = event_rx.try_recv() {
            saw_quit |= matches!(event, EmuEvent::Quit);
        }
        assert!(saw_quit, "quit event published");
    }
}
