//! Entry point for `supervisord`: runs an arbitrary command as a
//! well-behaved Unix daemon.
//!
//! Grounded on the original `main.c`'s `init()`/`prog()`: parse arguments,
//! install the termination handler, daemonize, fork the command, and enter
//! the wait loop. Exit codes follow spec.md §6: `0` for normal and
//! signal-induced shutdown, `1` for any startup failure.

use std::process::ExitCode;

use clap::Parser;
use nix::sys::signal::Signal;

use daemon_core::daemonizer;

use supervisord::cli::Cli;
use supervisord::errors::SupervisorError;
use supervisord::{child, telemetry};

const MAIN_TARGET: &str = "supervisord::main";

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: MAIN_TARGET, %error, "supervisord failed to start");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SupervisorError> {
    if cli.command.is_empty() {
        return Err(SupervisorError::MissingCommand);
    }

    child::install_signal_handlers(Signal::SIGTERM)?;

    let name = cli.name.unwrap_or_default();
    daemonizer::daemonize(&name)?;

    let pid = child::spawn(&cli.command)?;
    tracing::info!(target: MAIN_TARGET, child_pid = %pid, command = ?cli.command, "child started");

    child::wait_loop(pid);
}
