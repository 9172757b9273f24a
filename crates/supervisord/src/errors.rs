//! The unified error surface for `supervisord`'s startup and wait loop.
//!
//! Composes `daemon_core`'s per-subsystem errors the way
//! `weaverd::process::errors::LaunchError` composes `DaemonizeError`/
//! `ShutdownError`/`BootstrapError` into one top-level enum via `#[from]`.

use nix::errno::Errno;
use thiserror::Error;

use daemon_core::daemonizer::DaemonizeError;
use daemon_core::signal::SignalError;

/// Errors surfaced while starting or supervising the child process.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No command vector was supplied on the command line.
    #[error("usage: supervisord [--name SHORT_NAME] [--debug [LEVEL]] -- COMMAND [ARGS...]")]
    MissingCommand,
    /// Daemonizing the supervisor itself failed.
    #[error("failed to daemonize: {source}")]
    Daemonize {
        /// The underlying daemonizer error.
        #[source]
        source: DaemonizeError,
    },
    /// Installing a deferred signal handler failed.
    #[error("failed to install signal handler: {source}")]
    Signal {
        /// The underlying signal-dispatcher error.
        #[source]
        source: SignalError,
    },
    /// Forking the child process failed.
    #[error("failed to fork: {source}")]
    Fork {
        /// The underlying OS error.
        #[source]
        source: Errno,
    },
}

impl From<DaemonizeError> for SupervisorError {
    fn from(source: DaemonizeError) -> Self {
        Self::Daemonize { source }
    }
}

impl From<SignalError> for SupervisorError {
    fn from(source: SignalError) -> Self {
        Self::Signal { source }
    }
}
