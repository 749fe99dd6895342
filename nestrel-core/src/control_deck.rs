//! Control Deck implementation. The primary entry-point for emulating the NES.

use crate::{
    bus::Bus,
    cart::{self, Cart},
    common::{NesRegion, Regional, Reset, ResetKind},
    cpu::Cpu,
    fs,
    input::{Joypad, Player},
    mapper::{Mapped, Mapper},
    mem::RamState,
    ppu::Ppu,
    video::Video,
};
use serde::{Deserialize, Serialize};
use std::{
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info};

/// Save state version token. Bumped whenever the snapshot layout changes in
/// an incompatible way.
const SAVE_VERSION: &str = "0.2";

/// Result returned from [`ControlDeck`] methods.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that [`ControlDeck`] can return.
#[derive(Error, Debug)]
#[must_use]
pub enum Error {
    /// [`Cart`] error when loading a ROM.
    #[error(transparent)]
    Cart(#[from] cart::Error),
    /// Battery-backed RAM error.
    #[error("sram error: {0:?}")]
    Sram(fs::Error),
    /// Save state error.
    #[error("save state error: {0:?}")]
    SaveState(fs::Error),
    /// Save state version does not match the expected token.
    #[error("invalid save version (expected {expected:?}, found: {found:?})")]
    InvalidSaveVersion {
        expected: &'static str,
        found: String,
    },
    /// Save state file is missing or has a corrupt state entry.
    #[error("invalid save state file")]
    InvalidSaveState,
    /// When trying to load a save state that doesn't exist.
    #[error("no save state found")]
    NoSaveStateFound,
    /// Operational error indicating a ROM must be loaded first.
    #[error("no rom is loaded")]
    RomNotLoaded,
    /// The CPU fetched an opcode it cannot execute. Fatal.
    #[error("unsupported opcode ${opcode:02X} at ${pc:04X}")]
    UnsupportedOpcode { opcode: u8, pc: u16 },
    /// A mapped access fell outside its backing memory. Fatal.
    #[error("bus fault at ${addr:04X}")]
    BusFault { addr: u16 },
    /// Invalid file path.
    #[error("invalid file path {0:?}")]
    InvalidFilePath(PathBuf),
}

/// Single-stepping granularity for the clock loop.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum StepMode {
    /// Free-running.
    #[default]
    None,
    /// Pause after every PPU cycle.
    Cycle,
    /// Pause when the PPU scanline changes.
    Scanline,
    /// Pause after each completed frame.
    Frame,
}

/// Control deck configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[must_use]
pub struct Config {
    /// NES region. `Auto` derives the region from the loaded cart.
    pub region: NesRegion,
    /// RAM initialization state.
    pub ram_state: RamState,
    /// Data directory for storing battery-backed RAM and save states.
    pub data_dir: PathBuf,
}

impl Config {
    /// Base directory for storing nestrel data.
    pub const BASE_DIR: &'static str = "nestrel";
    /// Directory for storing battery-backed Cart RAM.
    pub const SRAM_DIR: &'static str = "sram";
    /// Directory for storing save states.
    pub const SAVE_DIR: &'static str = "save";

    /// Returns the default directory where nestrel data is stored.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir().map_or_else(|| PathBuf::from("data"), |dir| dir.join(Self::BASE_DIR))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: NesRegion::Auto,
            ram_state: RamState::default(),
            data_dir: Self::default_data_dir(),
        }
    }
}

/// Represents a loaded ROM [`Cart`].
#[derive(Debug, Clone)]
#[must_use]
pub struct LoadedRom {
    /// Name of ROM.
    pub name: String,
    /// Whether the loaded Cart is battery-backed.
    pub battery_backed: bool,
    /// Auto-detected region of the loaded Cart.
    pub region: NesRegion,
}

/// Output of a single clock-loop iteration.
#[derive(Default, Debug, Clone)]
#[must_use]
pub struct StepOutcome {
    /// CPU cycles consumed this iteration (zero when the PPU still owed
    /// cycles from the previous one).
    pub cpu_cycles: u64,
    /// PPU cycles consumed this iteration.
    pub ppu_cycles: u64,
    /// RGBA frame completed this iteration, if any.
    pub frame: Option<Vec<u8>>,
    /// Audio samples produced by the CPU cycles of this iteration.
    pub samples: Vec<i16>,
    /// The active step mode requests a pause after this iteration.
    pub pause: bool,
}

/// Serialized engine snapshot. The `meta` entry gates the version before the
/// `state` entry is decoded.
#[derive(Debug, Serialize, Deserialize)]
struct SaveMeta {
    version: String,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    cpu: &'a Cpu,
    ppu_quota: u64,
    step_mode: StepMode,
}

#[derive(Deserialize)]
struct Snapshot {
    cpu: Cpu,
    ppu_quota: u64,
    step_mode: StepMode,
}

/// Represents an NES Control Deck. Encapsulates the entire emulation state.
#[derive(Debug, Clone)]
#[must_use]
pub struct ControlDeck {
    /// Whether a ROM is loaded and the emulation is currently running or not.
    running: bool,
    /// Video decoding of the PPU's palette-index frames.
    video: Video,
    /// The currently loaded ROM [`Cart`], if any.
    loaded_rom: Option<LoadedRom>,
    /// Directory for storing battery-backed Cart RAM.
    sram_dir: PathBuf,
    /// Directory for storing save states.
    save_dir: PathBuf,
    /// Whether to auto-detect the region based on the loaded Cart.
    auto_detect_region: bool,
    /// PPU cycles owed, as a numerator against the region divisor
    /// denominator. `quota / den` PPU cycles are outstanding.
    ppu_quota: u64,
    /// Single-stepping granularity honored by [`ControlDeck::clock_step`].
    step_mode: StepMode,
    /// Whether the loaded mapper counts scanlines; queried once at wiring.
    scanline_counter: bool,
    /// NES CPU, owning the bus and all sub-devices.
    cpu: Cpu,
}

impl Default for ControlDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlDeck {
    /// Create a NES `ControlDeck` with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a NES `ControlDeck` with a configuration.
    pub fn with_config(cfg: Config) -> Self {
        let mut cpu = Cpu::new(Bus::new(cfg.region, cfg.ram_state));
        if cfg.region.is_auto() {
            cpu.set_region(NesRegion::Ntsc);
        } else {
            cpu.set_region(cfg.region);
        }
        Self {
            running: false,
            video: Video::new(),
            loaded_rom: None,
            sram_dir: cfg.data_dir.join(Config::SRAM_DIR),
            save_dir: cfg.data_dir.join(Config::SAVE_DIR),
            auto_detect_region: cfg.region.is_auto(),
            ppu_quota: 0,
            step_mode: StepMode::default(),
            scanline_counter: false,
            cpu,
        }
    }

    /// Loads a ROM cartridge into memory.
    ///
    /// # Errors
    ///
    /// If there is any issue loading the ROM, then an error is returned.
    pub fn load_rom<S: ToString, F: Read>(&mut self, name: S, rom: &mut F) -> Result<LoadedRom> {
        let name = name.to_string();
        self.unload_rom()?;
        let cart = Cart::from_rom(&name, rom, self.cpu.bus.ram_state)?;
        let loaded_rom = LoadedRom {
            name: name.clone(),
            battery_backed: cart.battery_backed(),
            region: cart.region(),
        };
        if self.auto_detect_region {
            self.cpu.set_region(loaded_rom.region);
        }
        self.scanline_counter = cart.mapper.has_scanline_counter();
        self.cpu.bus.load_cart(cart);
        self.reset(ResetKind::Hard);
        self.running = true;
        if loaded_rom.battery_backed {
            if let Err(err) = self.load_sram() {
                error!("failed to load SRAM: {err:?}");
            }
        }
        self.loaded_rom = Some(loaded_rom.clone());
        Ok(loaded_rom)
    }

    /// Loads a ROM cartridge into memory from a path.
    ///
    /// # Errors
    ///
    /// If there is any issue loading the ROM, then an error is returned.
    pub fn load_rom_path(&mut self, path: impl AsRef<Path>) -> Result<LoadedRom> {
        use std::{fs::File, io::BufReader};

        let path = path.as_ref();
        let filename = fs::filename(path);
        info!("loading ROM: {filename}");
        let rom = File::open(path)
            .map_err(|err| Error::Cart(cart::Error::io(err, format!("failed to open rom {path:?}"))))?;
        self.load_rom(filename, &mut BufReader::new(rom))
    }

    /// Unloads the currently loaded ROM and saves SRAM to disk if the Cart is
    /// battery-backed.
    pub fn unload_rom(&mut self) -> Result<()> {
        if self.loaded_rom.is_some() {
            if let Err(err) = self.save_sram() {
                error!("failed to save SRAM: {err:?}");
            }
        }
        self.loaded_rom = None;
        self.cpu.bus.unload_cart();
        self.scanline_counter = false;
        self.running = false;
        Ok(())
    }

    /// Returns the path to the battery-backed Save RAM file for the loaded ROM.
    #[must_use]
    pub fn sram_path(&self) -> Option<PathBuf> {
        self.loaded_rom
            .as_ref()
            .filter(|rom| rom.battery_backed)
            .map(|rom| self.sram_dir.join(&rom.name).with_extension("sram"))
    }

    /// Returns the path to the save state file for the loaded ROM.
    #[must_use]
    pub fn save_state_path(&self) -> Option<PathBuf> {
        self.loaded_rom
            .as_ref()
            .map(|rom| self.save_dir.join(&rom.name).with_extension("nst"))
    }

    /// Save battery-backed Save RAM to disk (if the cartridge supports it).
    ///
    /// # Errors
    ///
    /// If the file path is invalid or fails to save, then an error is returned.
    pub fn save_sram(&self) -> Result<()> {
        if let Some(path) = self.sram_path() {
            if path.is_dir() {
                return Err(Error::InvalidFilePath(path));
            }
            info!("saving SRAM...");
            fs::save(path, &self.cpu.bus.sram().to_vec()).map_err(Error::Sram)?;
        }
        Ok(())
    }

    /// Load battery-backed Save RAM from disk (if the cartridge supports it).
    ///
    /// # Errors
    ///
    /// If the file path is invalid or fails to load, then an error is returned.
    pub fn load_sram(&mut self) -> Result<()> {
        if let Some(path) = self.sram_path() {
            if path.is_file() {
                info!("loading SRAM...");
                let sram = fs::load::<Vec<u8>>(path).map_err(Error::Sram)?;
                self.cpu.bus.load_sram(sram);
            }
        }
        Ok(())
    }

    /// Save the current state of the console into a save file.
    ///
    /// The archive holds two entries: `meta` (the version token) and `state`
    /// (the compressed engine snapshot).
    ///
    /// # Errors
    ///
    /// If there is an issue saving the state, then an error is returned.
    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.loaded_rom.is_none() {
            return Err(Error::RomNotLoaded);
        }
        let path = path.as_ref();
        let mut writer = fs::writer(path).map_err(Error::SaveState)?;
        fs::write_header(&mut writer)
            .map_err(|err| Error::SaveState(fs::Error::WriteHeaderFailed(err)))?;
        bincode::serialize_into(
            &mut writer,
            &SaveMeta {
                version: SAVE_VERSION.to_string(),
            },
        )
        .map_err(|err| Error::SaveState(fs::Error::SerializationFailed(err.to_string())))?;
        let state = bincode::serialize(&SnapshotRef {
            cpu: &self.cpu,
            ppu_quota: self.ppu_quota,
            step_mode: self.step_mode,
        })
        .map_err(|err| Error::SaveState(fs::Error::SerializationFailed(err.to_string())))?;
        fs::encode(&mut writer, &state)
            .map_err(|err| Error::SaveState(fs::Error::EncodingFailed(err)))?;
        info!("saved state: {path:?}");
        Ok(())
    }

    /// Load the console state from a save file.
    ///
    /// Loading is all-or-nothing: the snapshot is fully decoded and version
    /// gated before any engine state is touched.
    ///
    /// # Errors
    ///
    /// If there is an issue loading the save state, then an error is returned.
    pub fn load_state(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.loaded_rom.is_none() {
            return Err(Error::RomNotLoaded);
        }
        let path = path.as_ref();
        if !fs::exists(path) {
            return Err(Error::NoSaveStateFound);
        }
        let mut reader = fs::reader(path).map_err(Error::SaveState)?;
        fs::validate_header(&mut reader).map_err(Error::SaveState)?;
        let meta: SaveMeta =
            bincode::deserialize_from(&mut reader).map_err(|_| Error::InvalidSaveState)?;
        if meta.version != SAVE_VERSION {
            return Err(Error::InvalidSaveVersion {
                expected: SAVE_VERSION,
                found: meta.version,
            });
        }
        let state = fs::decode(&mut reader).map_err(|_| Error::InvalidSaveState)?;
        let snapshot: Snapshot =
            bincode::deserialize(&state).map_err(|_| Error::InvalidSaveState)?;

        self.load_cpu(snapshot.cpu);
        self.ppu_quota = snapshot.ppu_quota;
        self.step_mode = snapshot.step_mode;
        info!("loaded state: {path:?}");
        Ok(())
    }

    /// Load a previously saved CPU state, re-attaching the ROM image which is
    /// not part of snapshots.
    pub fn load_cpu(&mut self, mut cpu: Cpu) {
        if cpu.bus.prg_rom.is_empty() {
            cpu.bus.prg_rom = std::mem::take(&mut self.cpu.bus.prg_rom);
        }
        if cpu.bus.ppu.bus.chr_rom.is_empty() {
            cpu.bus.ppu.bus.chr_rom = std::mem::take(&mut self.cpu.bus.ppu.bus.chr_rom);
        }
        cpu.trace_instrs = self.cpu.trace_instrs;
        self.cpu = cpu;
    }

    /// Run one iteration of the clock loop.
    ///
    /// Interleaves one CPU instruction with the PPU cycles it owes at the
    /// region's exact divisor. When a step mode is armed, the PPU phase stops
    /// at the requested boundary and the outcome asks the caller to pause.
    /// Audio samples are drained only on iterations that stepped the CPU.
    ///
    /// # Errors
    ///
    /// If the CPU jams or a mapped access faults, then an error is returned
    /// and emulation cannot continue.
    pub fn clock_step(&mut self) -> Result<StepOutcome> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        if !self.running {
            return Err(Error::RomNotLoaded);
        }
        let (num, den) = self.region().ppu_divisor();
        let mut outcome = StepOutcome::default();

        // CPU phase: only when the PPU is owed less than one full cycle
        let cpu_stepped = if self.ppu_quota < den {
            let opcode = self.cpu.bus.peek(self.cpu.pc);
            let pc = self.cpu.pc;
            let cycles = self.cpu.step();
            if self.cpu.corrupted {
                self.running = false;
                return Err(Error::UnsupportedOpcode { opcode, pc });
            }
            if let Some(addr) = self.cpu.bus.fault {
                self.running = false;
                return Err(Error::BusFault { addr });
            }
            self.ppu_quota += cycles * num;
            outcome.cpu_cycles = cycles;
            true
        } else {
            false
        };

        // PPU phase: consume whole owed cycles
        while self.ppu_quota >= den {
            let scanline_before = self.cpu.bus.ppu.scanline;
            if self.cpu.bus.ppu.clock() {
                outcome.frame = Some(self.video.decode(self.cpu.bus.ppu.frame_buffer()).to_vec());
                if self.step_mode == StepMode::Frame {
                    outcome.pause = true;
                }
            }
            if self.scanline_counter && self.cpu.bus.ppu.scanline_counter_trigger() {
                self.cpu.bus.ppu.bus.mapper.scanline_tick();
            }
            self.ppu_quota -= den;
            outcome.ppu_cycles += 1;
            match self.step_mode {
                StepMode::Cycle => outcome.pause = true,
                StepMode::Scanline if self.cpu.bus.ppu.scanline != scanline_before => {
                    outcome.pause = true;
                }
                _ => (),
            }
            if outcome.pause {
                break;
            }
        }

        // Sample drain, scoped to iterations where a CPU step occurred
        if cpu_stepped && self.ppu_quota < den {
            outcome.samples = self.cpu.bus.apu.drain_samples();
        }

        Ok(outcome)
    }

    /// Set the single-stepping granularity.
    pub fn set_step_mode(&mut self, mode: StepMode) {
        self.step_mode = mode;
    }

    /// The active single-stepping granularity.
    #[must_use]
    pub const fn step_mode(&self) -> StepMode {
        self.step_mode
    }

    /// Outstanding PPU cycles as an exact `(numerator, denominator)` pair.
    #[must_use]
    pub fn ppu_quota(&self) -> (u64, u64) {
        let (_, den) = self.cpu.bus.region.ppu_divisor();
        (self.ppu_quota, den)
    }

    /// Decode the most recent frame into RGBA.
    pub fn frame_buffer(&mut self) -> &[u8] {
        self.video.decode(self.cpu.bus.ppu.frame_buffer())
    }

    /// Get the current frame number.
    #[inline]
    #[must_use]
    pub const fn frame_number(&self) -> u32 {
        self.cpu.bus.ppu.frame_number()
    }

    /// Returns the name of the currently loaded ROM [`Cart`], if any.
    #[inline]
    #[must_use]
    pub const fn loaded_rom(&self) -> Option<&LoadedRom> {
        self.loaded_rom.as_ref()
    }

    /// Returns whether the control deck is currently running.
    #[inline]
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Returns a mutable reference to the [`Joypad`] for a controller port.
    #[inline]
    pub fn joypad_mut(&mut self, player: Player) -> &mut Joypad {
        self.cpu.bus.input.joypad_mut(player)
    }

    /// Returns the current [`Cpu`] state.
    #[inline]
    pub const fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Returns a mutable reference to the current [`Cpu`] state.
    #[inline]
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Returns the current [`Ppu`] state.
    #[inline]
    pub const fn ppu(&self) -> &Ppu {
        &self.cpu.bus.ppu
    }

    /// Returns the current [`Mapper`] state.
    #[inline]
    pub const fn mapper(&self) -> &Mapper {
        &self.cpu.bus.ppu.bus.mapper
    }

    /// Enable or disable CPU instruction tracing.
    #[inline]
    pub fn set_trace_instrs(&mut self, enabled: bool) {
        self.cpu.trace_instrs = enabled;
    }
}

impl Regional for ControlDeck {
    fn region(&self) -> NesRegion {
        self.cpu.bus.region
    }

    fn set_region(&mut self, region: NesRegion) {
        self.auto_detect_region = region.is_auto();
        if self.auto_detect_region {
            let region = self
                .loaded_rom
                .as_ref()
                .map(|rom| rom.region)
                .unwrap_or_default();
            self.cpu.set_region(region);
        } else {
            self.cpu.set_region(region);
        }
        // The quota denominator changed with the region
        self.ppu_quota = 0;
    }
}

impl Reset for ControlDeck {
    /// Resets the console.
    fn reset(&mut self, kind: ResetKind) {
        self.cpu.reset(kind);
        self.ppu_quota = 0;
        if self.loaded_rom.is_some() {
            self.running = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::JoypadBtn;

    /// Builds a minimal iNES image whose PRG starts with `prg` and resets to
    /// `$8000`.
    fn build_rom(prg: &[u8]) -> Vec<u8> {
        let mut rom = vec![
            0x4E, 0x45, 0x53, 0x1A, // NES\x1a
            0x01, 0x01, // 16K PRG, 8K CHR
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut prg_rom = vec![0x00; 0x4000];
        prg_rom[..prg.len()].copy_from_slice(prg);
        prg_rom[0x3FFC] = 0x00;
        prg_rom[0x3FFD] = 0x80;
        rom.extend(prg_rom);
        rom.extend(vec![0x00; 0x2000]);
        rom
    }

    fn init_tracing() {
        static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();
        INIT.get_or_init(|| {
            use tracing_subscriber::{
                filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt,
            };
            let _ = tracing_subscriber::registry()
                .with(
                    std::env::var("RUST_LOG")
                        .ok()
                        .and_then(|filter| filter.parse::<Targets>().ok())
                        .unwrap_or_default(),
                )
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init();
        });
    }

    fn load_deck(cfg: Config, prg: &[u8]) -> ControlDeck {
        init_tracing();
        let mut deck = ControlDeck::with_config(cfg);
        let rom = build_rom(prg);
        deck.load_rom("clock_test", &mut rom.as_slice())
            .expect("valid rom");
        deck
    }

    fn ntsc_deck(prg: &[u8]) -> ControlDeck {
        load_deck(
            Config {
                ram_state: RamState::AllZeros,
                ..Config::default()
            },
            prg,
        )
    }

    fn pal_deck(prg: &[u8]) -> ControlDeck {
        load_deck(
            Config {
                region: NesRegion::Pal,
                ram_state: RamState::AllZeros,
                ..Config::default()
            },
            prg,
        )
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("nestrel-{}-{name}", std::process::id()))
    }

    #[test]
    fn ntsc_ratio_is_exact() {
        // INC $0200,X takes exactly 7 cycles
        let mut deck = ntsc_deck(&[0xFE, 0x00, 0x02]);
        let outcome = deck.clock_step().expect("clock");
        assert_eq!(outcome.cpu_cycles, 7, "cpu cycles");
        assert_eq!(outcome.ppu_cycles, 21, "ppu cycles at 3:1");
        assert_eq!(deck.ppu_quota().0, 0, "no fractional residue");
    }

    #[test]
    fn pal_ratio_is_exact() {
        // STA $0200,X takes exactly 5 cycles
        let mut deck = pal_deck(&[0x9D, 0x00, 0x02]);
        let outcome = deck.clock_step().expect("clock");
        assert_eq!(outcome.cpu_cycles, 5, "cpu cycles");
        assert_eq!(outcome.ppu_cycles, 16, "ppu cycles at 16:5");
        assert_eq!(deck.ppu_quota().0, 0, "5 * 16/5 leaves no residue");
    }

    #[test]
    fn clock_invariant_holds_every_iteration() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]); // NOP; JMP $8000
        let (num, den) = deck.region().ppu_divisor();
        let mut cpu_cycles = 0u64;
        let mut ppu_cycles = 0u64;
        for _ in 0..10_000 {
            let outcome = deck.clock_step().expect("clock");
            cpu_cycles += outcome.cpu_cycles;
            ppu_cycles += outcome.ppu_cycles;
            let (quota, _) = deck.ppu_quota();
            assert_eq!(
                cpu_cycles * num,
                ppu_cycles * den + quota,
                "cpu_cycles * divisor == ppu_cycles + quota, exactly"
            );
            assert!(quota < den, "quota stays below one ppu cycle at rest");
        }
    }

    #[test]
    fn pal_invariant_holds_every_iteration() {
        let mut deck = pal_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        let (num, den) = deck.region().ppu_divisor();
        let mut cpu_cycles = 0u64;
        let mut ppu_cycles = 0u64;
        for _ in 0..10_000 {
            let outcome = deck.clock_step().expect("clock");
            cpu_cycles += outcome.cpu_cycles;
            ppu_cycles += outcome.ppu_cycles;
            let (quota, _) = deck.ppu_quota();
            assert_eq!(cpu_cycles * num, ppu_cycles * den + quota, "exact at 16/5");
        }
    }

    #[test]
    fn one_frame_event_per_frame() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        let mut frames = 0;
        let mut ppu_cycles = 0u64;
        // Two NTSC frames of PPU time
        while ppu_cycles < 2 * 341 * 262 {
            let outcome = deck.clock_step().expect("clock");
            ppu_cycles += outcome.ppu_cycles;
            frames += usize::from(outcome.frame.is_some());
        }
        assert_eq!(frames, 2, "exactly one frame event per completed frame");
    }

    #[test]
    fn cycle_step_pauses_after_one_ppu_cycle() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        deck.set_step_mode(StepMode::Cycle);
        let outcome = deck.clock_step().expect("clock");
        assert!(outcome.pause, "pause requested");
        assert_eq!(outcome.ppu_cycles, 1, "exactly one ppu cycle");
        // Owed cycles from the first instruction drain one at a time
        let (quota, den) = deck.ppu_quota();
        assert!(quota >= den, "quota still owed");
        let outcome = deck.clock_step().expect("clock");
        assert_eq!(outcome.cpu_cycles, 0, "no cpu step while quota owed");
        assert_eq!(outcome.ppu_cycles, 1, "one ppu cycle per unpause");
        assert!(outcome.pause, "pauses again");
        assert!(outcome.samples.is_empty(), "no sample drain without a cpu step");
    }

    #[test]
    fn scanline_step_pauses_on_scanline_change() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        deck.set_step_mode(StepMode::Scanline);
        let start = deck.ppu().scanline;
        let mut ppu_cycles = 0u64;
        loop {
            let outcome = deck.clock_step().expect("clock");
            ppu_cycles += outcome.ppu_cycles;
            if outcome.pause {
                break;
            }
        }
        assert_ne!(deck.ppu().scanline, start, "paused on a new scanline");
        assert!(ppu_cycles <= 341, "paused at the first boundary");
    }

    #[test]
    fn frame_step_pauses_on_frame() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        deck.set_step_mode(StepMode::Frame);
        let start = deck.frame_number();
        loop {
            let outcome = deck.clock_step().expect("clock");
            if outcome.pause {
                assert!(outcome.frame.is_some(), "pausing iteration carries the frame");
                break;
            }
        }
        assert_eq!(deck.frame_number(), start + 1, "exactly one frame ran");
    }

    #[test]
    fn unsupported_opcode_is_fatal() {
        let mut deck = ntsc_deck(&[0x02]); // jam
        let err = deck.clock_step().expect_err("jam must error");
        assert!(
            matches!(err, Error::UnsupportedOpcode { opcode: 0x02, .. }),
            "unexpected error: {err:?}"
        );
        assert!(!deck.is_running(), "deck stopped");
        assert!(
            matches!(deck.clock_step(), Err(Error::RomNotLoaded)),
            "further clocking refused"
        );
    }

    #[test]
    fn reset_is_idempotent() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        for _ in 0..100 {
            deck.clock_step().expect("clock");
        }
        deck.reset(ResetKind::Hard);
        let cycle_once = deck.cpu().cycle;
        let pc_once = deck.cpu().pc;
        deck.reset(ResetKind::Hard);
        assert_eq!(deck.cpu().cycle, cycle_once, "cycle counter identical");
        assert_eq!(deck.cpu().pc, pc_once, "pc identical");
        assert_eq!(deck.ppu_quota().0, 0, "quota cleared");

        let fresh = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        assert_eq!(deck.cpu().pc, fresh.cpu().pc, "matches a fresh deck");
        assert_eq!(deck.cpu().cycle, fresh.cpu().cycle, "cycles match fresh deck");
    }

    #[test]
    fn save_then_load_resumes_identically() {
        let prg = &[0xEA, 0x4C, 0x00, 0x80];
        let mut deck = ntsc_deck(prg);
        // Enable rendering so frames carry real pixels
        deck.cpu_mut().bus.write(0x2001, 0x1E);
        for _ in 0..50_000 {
            deck.clock_step().expect("clock");
        }

        let path = temp_path("roundtrip.nst");
        deck.save_state(&path).expect("save state");

        let mut restored = ntsc_deck(prg);
        for _ in 0..123 {
            restored.clock_step().expect("clock");
        }
        restored.load_state(&path).expect("load state");
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.cpu().pc, deck.cpu().pc, "pc restored");
        assert_eq!(restored.cpu().cycle, deck.cpu().cycle, "cycles restored");
        assert_eq!(restored.ppu_quota(), deck.ppu_quota(), "quota restored");

        // Both decks must produce bit-identical frames from here on
        let target = deck.frame_number() + 2;
        let mut frame_a = None;
        while deck.frame_number() < target {
            if let Some(frame) = deck.clock_step().expect("clock").frame {
                frame_a = Some(frame);
            }
        }
        let mut frame_b = None;
        while restored.frame_number() < target {
            if let Some(frame) = restored.clock_step().expect("clock").frame {
                frame_b = Some(frame);
            }
        }
        assert_eq!(frame_a, frame_b, "frames identical after save/load");
    }

    #[test]
    fn version_mismatch_leaves_state_unchanged() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        for _ in 0..1_000 {
            deck.clock_step().expect("clock");
        }
        let path = temp_path("version.nst");

        // Write a save with a corrupted version token
        let mut writer = fs::writer(&path).expect("writer");
        fs::write_header(&mut writer).expect("header");
        bincode::serialize_into(
            &mut writer,
            &SaveMeta {
                version: "0.1".to_string(),
            },
        )
        .expect("meta");
        drop(writer);

        let pc_before = deck.cpu().pc;
        let cycle_before = deck.cpu().cycle;
        let err = deck.load_state(&path).expect_err("version mismatch");
        std::fs::remove_file(&path).ok();
        assert!(
            matches!(err, Error::InvalidSaveVersion { expected: "0.2", .. }),
            "unexpected error: {err:?}"
        );
        assert_eq!(deck.cpu().pc, pc_before, "pc untouched");
        assert_eq!(deck.cpu().cycle, cycle_before, "cycles untouched");
    }

    #[test]
    fn truncated_save_state_rejected() {
        let mut deck = ntsc_deck(&[0xEA, 0x4C, 0x00, 0x80]);
        deck.clock_step().expect("clock");
        let path = temp_path("truncated.nst");

        // Valid header and meta but no state entry
        let mut writer = fs::writer(&path).expect("writer");
        fs::write_header(&mut writer).expect("header");
        bincode::serialize_into(
            &mut writer,
            &SaveMeta {
                version: SAVE_VERSION.to_string(),
            },
        )
        .expect("meta");
        drop(writer);

        let err = deck.load_state(&path).expect_err("missing state entry");
        std::fs::remove_file(&path).ok();
        assert!(
            matches!(err, Error::InvalidSaveState),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn snapshot_includes_controller_latches() {
        let prg = &[0xEA, 0x4C, 0x00, 0x80];
        let mut deck = ntsc_deck(prg);
        deck.joypad_mut(Player::One).set_button(JoypadBtn::Start, true);
        deck.clock_step().expect("clock");

        let path = temp_path("joypad.nst");
        deck.save_state(&path).expect("save");
        let mut restored = ntsc_deck(prg);
        restored.load_state(&path).expect("load");
        std::fs::remove_file(&path).ok();

        assert!(
            restored
                .joypad_mut(Player::One)
                .button(crate::input::JoypadBtnState::START),
            "controller latch restored"
        );
    }

    #[test]
    fn mmc3_scanline_ticks_once_per_scanline() {
        // Mapper 4 ROM: enable rendering, set IRQ latch, and spin
        let mut rom = vec![
            0x4E, 0x45, 0x53, 0x1A,
            0x02, 0x01, // 32K PRG, 8K CHR
            0x40, 0x00, // mapper 4
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut prg = vec![0x00; 0x8000];
        // LDA #$1E; STA $2001; JMP $8005
        prg[..8].copy_from_slice(&[0xA9, 0x1E, 0x8D, 0x01, 0x20, 0x4C, 0x05, 0x80]);
        prg[0x7FFC] = 0x00;
        prg[0x7FFD] = 0x80;
        rom.extend(&prg);
        rom.extend(vec![0x00; 0x2000]);

        let mut deck = ControlDeck::with_config(Config {
            ram_state: RamState::AllZeros,
            ..Config::default()
        });
        deck.load_rom("mmc3_scanline", &mut rom.as_slice())
            .expect("valid rom");

        // Arm the IRQ counter: latch 10, reload, enable
        let mapper = &mut deck.cpu_mut().bus.ppu.bus.mapper;
        use crate::mapper::MemMap;
        mapper.map_write(0xC000, 10);
        mapper.map_write(0xC001, 0x00);
        mapper.map_write(0xE001, 0x00);

        // Run one full frame; the counter reloads on the first rendered
        // scanline edge and decrements once per scanline after
        let mut ppu_cycles = 0u64;
        while ppu_cycles < 341 * 262 {
            ppu_cycles += deck.clock_step().expect("clock").ppu_cycles;
        }
        assert!(
            deck.mapper().irq_pending(),
            "irq asserted after latch scanlines"
        );
    }
}
