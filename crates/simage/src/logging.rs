//! Log output for the CLI.
//!
//! Everything goes to stderr through `tracing`, as text or JSON. The
//! `[logging]` section picks the level for simage's own crates; dependencies
//! only get through at `warn`. `RUST_LOG`, when set, replaces all of this.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const OWN_CRATES: [&str; 2] = ["simage", "simage_core"];

/// The level simage logs at: the configured one, raised to at least
/// `debug` by `--verbose`. Unknown names fall back to `info`.
fn effective_level(configured: &str, verbose: bool) -> LevelFilter {
    let level = configured
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    if verbose {
        level.max(LevelFilter::DEBUG)
    } else {
        level
    }
}

/// Filter directives: `warn` for everything, `level` for our crates.
fn directives(level: LevelFilter) -> String {
    let level = level.to_string().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for krate in OWN_CRATES {
        directives.push_str(&format!(",{krate}={level}"));
    }
    directives
}

/// Install the global subscriber.
pub fn init(level: LevelFilter, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` config section. The CLI flags can
/// only raise verbosity or switch to JSON.
pub fn init_from_config(
    config: &simage_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let level = effective_level(&config.logging.level, verbose_override);
    let json_format = json_logs_override || config.logging.format == "json";
    init(level, json_format);
}
