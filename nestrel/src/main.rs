//! A cross-platform NES emulator written in Rust.
//!
//! USAGE:
//!     nestrel [OPTIONS] <path>
//!
//! ARGS:
//!     <path>    The NES ROM to load.

use clap::Parser;
use nestrel::{logging, nes::Nes};
use std::process::ExitCode;
use tracing::error;

mod opts;

fn main() -> ExitCode {
    logging::init();

    #[cfg(feature = "profiling")]
    puffin::set_scopes_on(true);

    let opts = opts::Opts::parse();
    tracing::debug!("CLI options: {opts:?}");

    let (config, rom_path) = match opts.load() {
        Ok(loaded) => loaded,
        Err(err) => {
            error!("{err:?}");
            return ExitCode::FAILURE;
        }
    };

    match Nes::run(config, rom_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
