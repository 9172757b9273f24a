//! Forks the target command, becomes its parent, forwards termination to
//! the process group, and reaps the child — spec.md §4.4's supervisor
//! loop.
//!
//! Grounded on the original `main.c`'s `prog()`/`terminate()`/`stop()`,
//! generalised from raw libc calls to `nix::unistd::{fork, execvp}` and
//! `nix::sys::wait::waitpid`. `daemon_core::signal` supplies the deferred
//! dispatch the wait loop drains on every pass.

use std::ffi::CString;

use nix::errno::Errno;
use nix::sys::signal::{SaFlags, Signal, killpg};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, execvp, fork};

use daemon_core::{daemonizer, signal};

use crate::errors::SupervisorError;

const CHILD_TARGET: &str = "supervisord::child";

/// Installs `signo` as the process-termination signal, plus a `SIGHUP`
/// handler that only logs receipt. The supervisor ships no reload
/// behaviour of its own; library callers who need one register their own
/// `SIGHUP` handler through `daemon_core::signal` instead, per spec.md §6.
///
/// Both catchers are installed with empty flags, deliberately omitting
/// `SA_RESTART`: [`wait_loop`] depends on `waitpid` returning `EINTR` when
/// `signo` arrives so it can drain the deferred dispatch and forward the
/// signal before waiting again.
pub fn install_signal_handlers(signo: Signal) -> Result<(), SupervisorError> {
    signal::set_handler(signo, SaFlags::empty(), handle_termination, &[])?;
    signal::set_handler(Signal::SIGHUP, SaFlags::empty(), handle_hangup, &[])?;
    Ok(())
}

/// Forks and, in the child, replaces its image with `command` via the
/// path-searching exec family. Returns the child's pid to the parent.
pub fn spawn(command: &[String]) -> Result<Pid, SupervisorError> {
    // SAFETY: the process is still single-threaded at this point; the
    // child performs only an exec, or an async-signal-safe `_exit`, before
    // returning control to the kernel.
    match unsafe { fork() }.map_err(|source| SupervisorError::Fork { source })? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => exec_or_die(command),
    }
}

fn exec_or_die(command: &[String]) -> ! {
    let program = command.first().map_or_else(String::new, String::clone);

    let Some(c_program) = command.first().and_then(|arg| CString::new(arg.as_str()).ok()) else {
        tracing::error!(target: CHILD_TARGET, "command name contains an embedded NUL");
        nix::unistd::_exit(1);
    };

    let c_args: Vec<CString> = command
        .iter()
        .filter_map(|arg| CString::new(arg.as_str()).ok())
        .collect();

    match execvp(&c_program, &c_args) {
        Ok(never) => match never {},
        Err(source) => {
            tracing::error!(target: CHILD_TARGET, command = %program, %source, "exec failed");
            nix::unistd::_exit(1);
        }
    }
}

/// Repeatedly dispatches pending signals and waits for `pid`. Exits the
/// process with status 0 on a successful reap, or on any wait failure
/// other than an interrupted system call, per spec.md §4.4.
pub fn wait_loop(pid: Pid) -> ! {
    loop {
        signal::dispatch_all();
        match waitpid(pid, None) {
            Ok(_status) => shutdown(),
            Err(Errno::EINTR) => {}
            Err(source) => {
                tracing::warn!(target: CHILD_TARGET, %source, "wait failed; shutting down");
                shutdown();
            }
        }
    }
}

/// The termination handler: forwards `received` to the whole process
/// group (propagating shutdown to the child without tracking
/// grandchildren), then releases the pidfile and exits with status 0. A
/// `received` of `0` marks a synthetic internal call — made by the wait
/// loop itself once the child has already exited — and must not broadcast.
fn handle_termination(received: i32) {
    if received != 0 {
        match Signal::try_from(received) {
            Ok(signal) => {
                if let Err(source) = killpg(Pid::from_raw(0), signal) {
                    tracing::warn!(target: CHILD_TARGET, %source, "failed to forward signal to process group");
                }
            }
            Err(source) => {
                tracing::warn!(target: CHILD_TARGET, %source, received, "received an unrecognised signal number");
            }
        }
    }
    shutdown();
}

fn handle_hangup(_received: i32) {
    tracing::info!(target: CHILD_TARGET, "received SIGHUP; no reload behaviour configured");
}

fn shutdown() -> ! {
    daemonizer::close_daemon();
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_rejects_a_command_with_an_embedded_nul() {
        // exec_or_die always terminates the process, so only its argument
        // validation is exercised here rather than calling it directly.
        let command = vec!["bad\0program".to_string()];
        let result = CString::new(command.first().expect("first").as_str());
        assert!(result.is_err());
    }
}
