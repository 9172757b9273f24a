//! Detaches the current process into a well-behaved daemon and, optionally,
//! enforces a pidfile singleton.
//!
//! Grounded on `libslack/daemon.c`'s `daemon_started_by_init`/
//! `daemon_started_by_inetd`/`daemon_prevent_core`/`daemon_init`/
//! `daemon_close`/`daemon_revoke_privileges`/`daemon_file_is_safe`.

mod pidfile;

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::Path;
use std::sync::OnceLock;

use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::resource::{Resource, getrlimit, setrlimit};
use nix::sys::socket::{getsockopt, sockopt};
use nix::sys::stat::Mode;
use nix::unistd::{
    ForkResult, Gid, Pid, Uid, chdir, close, dup2, fork, getegid, geteuid, getgid, getppid, getuid,
    setgid, setgroups, setsid, setuid, umask,
};
use thiserror::Error;

pub use pidfile::{PID_DIR, PidFile, PidFileError};

use crate::DAEMONIZER_TARGET;
use crate::limits::max_open_files;

/// Errors surfaced while daemonizing.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// A step in the detachment sequence failed.
    #[error("daemonization step failed: {source}")]
    System {
        /// The underlying OS error.
        #[source]
        source: Errno,
    },
    /// Installing the pidfile failed.
    #[error("failed to install pidfile: {source}")]
    PidFile {
        /// The underlying pidfile error.
        #[source]
        source: PidFileError,
    },
}

impl From<Errno> for DaemonizeError {
    fn from(source: Errno) -> Self {
        Self::System { source }
    }
}

impl From<PidFileError> for DaemonizeError {
    fn from(source: PidFileError) -> Self {
        Self::PidFile { source }
    }
}

static STARTED_BY_INIT: OnceLock<bool> = OnceLock::new();
static STARTED_BY_INETD: OnceLock<bool> = OnceLock::new();

/// Returns true iff this process's parent is pid 1, i.e. it was started by
/// `init(8)` and therefore must not fork-and-exit or close its descriptors.
/// Cached for the life of the process.
#[must_use]
pub fn detect_started_by_init() -> bool {
    *STARTED_BY_INIT.get_or_init(|| getppid() == Pid::from_raw(1))
}

/// Returns true iff standard input refers to a socket, i.e. this process
/// was started by `inetd(8)`. Cached for the life of the process.
#[must_use]
pub fn detect_started_by_inetd() -> bool {
    *STARTED_BY_INETD.get_or_init(|| {
        // SAFETY: fd 0 is valid for the life of the process; we only borrow it.
        let stdin = unsafe { BorrowedFd::borrow_raw(0) };
        getsockopt(&stdin, sockopt::SockType).is_ok()
    })
}

/// Reduces the core-file resource limit to zero, preventing core dumps that
/// could leak sensitive daemon state.
pub fn prevent_core_dumps() -> Result<(), DaemonizeError> {
    let (_soft, hard) = getrlimit(Resource::RLIMIT_CORE)?;
    setrlimit(Resource::RLIMIT_CORE, 0, hard)?;
    Ok(())
}

/// Performs the detachment sequence and, if `name` is non-empty, installs
/// the pidfile singleton. Each step of the detachment sequence (the two
/// forks and becoming a session leader) is skipped when the process was
/// started by `init(8)` or `inetd(8)`, since there is no controlling
/// terminal to lose in either case.
pub fn daemonize(name: &str) -> Result<(), DaemonizeError> {
    let skip_fork = detect_started_by_init() || detect_started_by_inetd();

    if !skip_fork {
        background()?;
        setsid()?;
        #[cfg(feature = "svr4-double-fork")]
        background()?;
    }

    chdir("/")?;
    umask(Mode::empty());

    sanitize_descriptors()?;

    if !name.is_empty() {
        pidfile::install(name)?;
    }

    tracing::info!(target: DAEMONIZER_TARGET, name, skip_fork, "daemonized");
    Ok(())
}

/// Forks and exits the parent immediately, leaving the child to continue.
/// Used twice in the detachment sequence: once to lose process-group
/// leadership, and again (under the `svr4-double-fork` feature) to lose
/// session leadership so a controlling terminal can never be reacquired.
fn background() -> Result<(), DaemonizeError> {
    // SAFETY: this process is still single-threaded at daemonization time;
    // the child performs only async-signal-safe work before exec or exit.
    match unsafe { fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

fn sanitize_descriptors() -> Result<(), DaemonizeError> {
    let nopen = RawFd::try_from(max_open_files()).unwrap_or(RawFd::MAX);

    if detect_started_by_inetd() {
        for fd in 0..nopen {
            if fd != 0 && fd != 1 && fd != 2 {
                close(fd).ok();
            }
        }
        return Ok(());
    }

    for fd in 0..nopen {
        close(fd).ok();
    }

    let devnull = open("/dev/null", OFlag::O_RDWR, Mode::empty())?;
    if devnull != 0 {
        dup2(devnull, 0)?;
        close(devnull).ok();
    }
    dup2(0, 1)?;
    dup2(0, 2)?;

    Ok(())
}

/// Unlinks the pidfile (if any) and releases the lock. Always succeeds.
pub fn close_daemon() {
    pidfile::close();
}

/// Sets the effective gid to the real gid, and the effective uid to the
/// real uid, if they differ; verifies the change took effect. Kept as a
/// separate, opt-in operation rather than part of [`daemonize`] — most
/// callers run as the invoking user already and should not pay for
/// `setgroups`/`setgid`/`setuid` by accident.
pub fn revoke_privileges() -> Result<(), DaemonizeError> {
    let uid = getuid();
    let gid = getgid();
    let euid = geteuid();
    let egid = getegid();

    if euid.is_root() && euid != uid {
        setgroups(&[gid])?;
    }

    if egid != gid {
        setgid(gid)?;
        if getegid() != getgid() {
            return Err(Errno::EPERM.into());
        }
    }

    if uid != euid {
        setuid(uid)?;
        if getuid() != geteuid() {
            return Err(Errno::EPERM.into());
        }
    }

    Ok(())
}

/// Checks that `path`, and every containing directory up to the root, is
/// not group- or world-writable. Supplements the original `daemon(3)`
/// module's `daemon_file_is_safe`, used by `supervisord` to refuse a
/// `--name` whose pidfile directory is world-writable.
pub fn path_is_safe(path: &Path) -> Result<bool, DaemonizeError> {
    if !component_is_safe(path)? {
        return Ok(false);
    }

    let mut current = path;
    while let Some(parent) = current.parent() {
        if parent.as_os_str().is_empty() {
            break;
        }
        if !component_is_safe(parent)? {
            return Ok(false);
        }
        if parent == Path::new("/") {
            break;
        }
        current = parent;
    }

    Ok(true)
}

fn component_is_safe(path: &Path) -> Result<bool, DaemonizeError> {
    let status = nix::sys::stat::stat(path)?;
    let mode = Mode::from_bits_truncate(status.st_mode);
    Ok(!mode.intersects(Mode::S_IWGRP | Mode::S_IWOTH))
}

trait Rootish {
    fn is_root(self) -> bool;
}

impl Rootish for Uid {
    fn is_root(self) -> bool {
        self == Uid::from_raw(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_safe_flags_world_writable_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut perms = std::fs::metadata(dir.path()).expect("metadata").permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o777);
        std::fs::set_permissions(dir.path(), perms).expect("chmod");

        let target = dir.path().join("pidfile");
        std::fs::write(&target, b"").expect("touch file");

        assert!(!path_is_safe(&target).expect("path_is_safe"));
    }

    #[test]
    fn path_is_safe_accepts_private_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut perms = std::fs::metadata(dir.path()).expect("metadata").permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o700);
        std::fs::set_permissions(dir.path(), perms).expect("chmod");

        let target = dir.path().join("pidfile");
        std::fs::write(&target, b"").expect("touch file");

        assert!(path_is_safe(&target).expect("path_is_safe"));
    }
}
