//! A named FIFO that guarantees exactly one live reader and a read side
//! that never spuriously observes end-of-file.
//!
//! Grounded on the original `fifo.c`'s `fifo_exists`/`fifo_has_reader`/
//! `fifo_open` sequence: probe, liveness-check, create, open nonblocking,
//! re-stat to guard against a racing substitution, open a blocking
//! self-writer, optionally lock it, then switch the reader back to
//! blocking mode.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, OFlag, open};
use nix::sys::stat::{Mode, SFlag, fstat, mkfifo, stat};
use nix::unistd::close;
use thiserror::Error;

use crate::FIFO_TARGET;

/// Errors surfaced while opening or reusing a FIFO.
#[derive(Debug, Error)]
pub enum FifoError {
    /// `path` exists and already has a live reader attached.
    #[error("fifo '{path}' already has a reader")]
    AddressInUse {
        /// The FIFO path that already has a reader.
        path: String,
    },
    /// A racing process replaced the FIFO with something else mid-open.
    #[error("path '{path}' was replaced with a non-fifo while opening")]
    Replaced {
        /// The path that stopped being a FIFO.
        path: String,
    },
    /// The exclusive lock on the self-writer could not be acquired.
    #[error("failed to lock fifo '{path}': would block")]
    WouldBlock {
        /// The FIFO path whose lock is held elsewhere.
        path: String,
    },
    /// A system call failed.
    #[error("system call failed while opening fifo '{path}': {source}")]
    System {
        /// The FIFO path being operated on.
        path: String,
        /// The underlying OS error.
        #[source]
        source: Errno,
    },
}

impl FifoError {
    fn system(path: &Path, source: Errno) -> Self {
        Self::System {
            path: path.display().to_string(),
            source,
        }
    }
}

/// An open FIFO rendezvous: a blocking read descriptor plus the self-writer
/// that keeps it from ever observing end-of-file.
#[derive(Debug)]
pub struct FifoEndpoint {
    read: OwnedFd,
    #[allow(dead_code, reason = "kept alive only to hold the self-writer open")]
    write: OwnedFd,
}

impl FifoEndpoint {
    /// The blocking read descriptor. A `read` on this never returns `0`
    /// bytes (end-of-file) for as long as the endpoint is held.
    #[must_use]
    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

/// Determines whether `path` refers to an existing FIFO. If `path` exists
/// but is not a FIFO and `unlink_foreign` is set, it is removed.
fn fifo_exists(path: &Path, unlink_foreign: bool) -> Result<bool, FifoError> {
    match stat(path) {
        Ok(status) => {
            if SFlag::from_bits_truncate(status.st_mode).contains(SFlag::S_IFIFO) {
                Ok(true)
            } else {
                if unlink_foreign {
                    std::fs::remove_file(path).ok();
                }
                Ok(false)
            }
        }
        Err(Errno::ENOENT) => Ok(false),
        Err(source) => Err(FifoError::system(path, source)),
    }
}

/// Determines whether `path` refers to a FIFO that another process is
/// already reading from.
fn fifo_has_reader(path: &Path) -> Result<bool, FifoError> {
    if !fifo_exists(path, true)? {
        return Ok(false);
    }

    match open(path, OFlag::O_WRONLY | OFlag::O_NONBLOCK, Mode::empty()) {
        Ok(fd) => {
            close(fd).ok();
            Ok(true)
        }
        Err(Errno::ENXIO) => Ok(false),
        Err(source) => Err(FifoError::system(path, source)),
    }
}

fn write_lock(fd: RawFd) -> Result<(), Errno> {
    // SAFETY: a zeroed `flock` is a valid representation; every field we
    // don't set explicitly below is meant to be zero for a whole-file lock.
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = libc::F_WRLCK as libc::c_short;
    lock.l_whence = libc::SEEK_SET as libc::c_short;
    lock.l_start = 0;
    lock.l_len = 0;

    fcntl::fcntl(fd, FcntlArg::F_SETLK(&lock)).map(|_| ())
}

fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<(), Errno> {
    let current = fcntl::fcntl(fd, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(current);
    flags.set(OFlag::O_NONBLOCK, nonblocking);
    fcntl::fcntl(fd, FcntlArg::F_SETFL(flags)).map(|_| ())
}

fn verify_fifo(fd: RawFd, path: &Path) -> Result<(), FifoError> {
    let status = fstat(fd).map_err(|source| FifoError::system(path, source))?;
    if SFlag::from_bits_truncate(status.st_mode).contains(SFlag::S_IFIFO) {
        Ok(())
    } else {
        Err(FifoError::Replaced {
            path: path.display().to_string(),
        })
    }
}

/// Opens `path` as a FIFO rendezvous, creating it if necessary. Fails with
/// [`FifoError::AddressInUse`] if another process already holds the reader
/// role. When `lock` is set, takes an exclusive advisory lock on the
/// self-writer so that only one invocation anywhere on the host can win the
/// race to become the reader.
pub fn open_fifo(path: &Path, mode: Mode, lock: bool) -> Result<FifoEndpoint, FifoError> {
    if fifo_has_reader(path)? {
        return Err(FifoError::AddressInUse {
            path: path.display().to_string(),
        });
    }

    match mkfifo(path, mode) {
        Ok(()) | Err(Errno::EEXIST) => {}
        Err(source) => return Err(FifoError::system(path, source)),
    }

    let read_raw = open(path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())
        .map_err(|source| FifoError::system(path, source))?;
    // SAFETY: `read_raw` was just returned by `open` and is not owned elsewhere.
    let read = unsafe { OwnedFd::from_raw_fd(read_raw) };
    verify_fifo(read.as_raw_fd(), path)?;

    let write_raw =
        open(path, OFlag::O_WRONLY, Mode::empty()).map_err(|source| FifoError::system(path, source))?;
    // SAFETY: `write_raw` was just returned by `open` and is not owned elsewhere.
    let write = unsafe { OwnedFd::from_raw_fd(write_raw) };
    verify_fifo(write.as_raw_fd(), path)?;

    if lock {
        match write_lock(write.as_raw_fd()) {
            Ok(()) => {}
            Err(Errno::EAGAIN | Errno::EACCES) => {
                return Err(FifoError::WouldBlock {
                    path: path.display().to_string(),
                });
            }
            Err(source) => return Err(FifoError::system(path, source)),
        }
    }

    set_nonblocking(read.as_raw_fd(), false).map_err(|source| FifoError::system(path, source))?;

    tracing::info!(target: FIFO_TARGET, path = %path.display(), locked = lock, "fifo rendezvous opened");

    Ok(FifoEndpoint { read, write })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_fifo_creates_and_holds_self_writer() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("rendezvous");
        let endpoint = open_fifo(&path, Mode::from_bits_truncate(0o600), true).expect("open");
        assert!(endpoint.read_fd() >= 0);
        assert!(path.exists());
    }

    #[test]
    fn open_fifo_rejects_when_a_reader_already_exists() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("rendezvous");
        let _first = open_fifo(&path, Mode::from_bits_truncate(0o600), false).expect("open");
        let second = open_fifo(&path, Mode::from_bits_truncate(0o600), false);
        assert!(matches!(second, Err(FifoError::AddressInUse { .. })));
    }

    #[test]
    fn open_fifo_replaces_a_non_fifo_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("rendezvous");
        std::fs::write(&path, b"not a fifo").expect("write plain file");
        let endpoint = open_fifo(&path, Mode::from_bits_truncate(0o600), false).expect("open");
        assert!(endpoint.read_fd() >= 0);
    }
}
