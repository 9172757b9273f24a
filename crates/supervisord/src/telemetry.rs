//! Structured telemetry initialisation for `supervisord`.
//!
//! Grounded on `weaverd::telemetry`: a `tracing-subscriber` `fmt`
//! subscriber, compact on a tty and JSON otherwise, installed once at
//! startup. `weaverd` derives its filter from a config-file log level;
//! `supervisord` carries no config file (spec.md §1 treats the line-
//! oriented configuration reader as an external collaborator), so the
//! filter is derived directly from `--debug <n>` instead.

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Maps `--debug`'s verbosity level to a `tracing` level threshold.
/// Absent or zero means "info and above"; each further level lowers the
/// threshold by one step, bottoming out at `TRACE`.
#[must_use]
pub fn level_for_debug(debug: Option<u32>) -> Level {
    match debug.unwrap_or(0) {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the global `tracing` subscriber. Compact formatting when
/// stderr is a tty, JSON otherwise, matching `weaverd::telemetry`'s
/// `LogFormat` selection.
pub fn init(debug: Option<u32>) {
    let level = level_for_debug(debug);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    if std::io::stderr().is_terminal() {
        builder.compact().init();
    } else {
        builder.json().flatten_event(true).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_levels_map_monotonically() {
        assert_eq!(level_for_debug(None), Level::INFO);
        assert_eq!(level_for_debug(Some(0)), Level::INFO);
        assert_eq!(level_for_debug(Some(1)), Level::DEBUG);
        assert_eq!(level_for_debug(Some(5)), Level::TRACE);
    }
}
