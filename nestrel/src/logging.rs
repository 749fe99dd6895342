use std::env;
use tracing_subscriber::{filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging.
///
/// Honors `RUST_LOG` when set, with a compile-mode-dependent default filter.
pub fn init() {
    let default_filter = if cfg!(debug_assertions) {
        "warn,nestrel=debug,nestrel_core=debug"
    } else {
        "warn,nestrel=info,nestrel_core=info"
    }
    .parse::<Targets>()
    .expect("valid filter");

    let registry = tracing_subscriber::registry()
        .with(
            env::var("RUST_LOG")
                .ok()
                .and_then(|filter| filter.parse::<Targets>().ok())
                .unwrap_or(default_filter),
        )
        .with(fmt::layer().compact().with_writer(std::io::stderr));
    if let Err(err) = registry.try_init() {
        eprintln!("setting tracing default failed: {err:?}");
    }
}
