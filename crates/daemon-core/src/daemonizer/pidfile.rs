//! Pidfile creation, locking and the process-wide singleton that owns it.
//!
//! Grounded on `libslack/daemon.c`'s `daemon_pidfile`/`daemon_close`: create
//! the file exclusively, fall back to opening an existing one, take a
//! non-blocking exclusive `fcntl` write lock on the whole file, then write
//! the pid. Failure between file creation and lock acquisition leaves an
//! unlocked file behind; this is reclaimed by the next invocation, not
//! treated as an error.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, fcntl};
use nix::unistd::getpid;
use thiserror::Error;

use crate::DAEMONIZER_TARGET;
use crate::limits::max_path_len;

/// Default value of `PID_DIR`: the well-known location for pidfiles.
/// A compile-time constant per the original `daemon(3)` module; override by
/// rebuilding with a different value if `/var/run` is not writable.
pub const PID_DIR: &str = "/var/run";

const PIDFILE_MODE: u32 = 0o644;

/// Errors surfaced while creating or locking a pidfile.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// The assembled path exceeds the filesystem's maximum path length.
    #[error("pidfile path for '{name}' exceeds the maximum path length")]
    PathTooLong {
        /// The daemon short name that produced an overlong path.
        name: String,
    },
    /// A live peer already holds the lock.
    #[error("pidfile '{path}' is held by a live process")]
    AddressInUse {
        /// The pidfile path already locked by another process.
        path: PathBuf,
    },
    /// Writing the pid came up short; the pidfile was removed.
    #[error("short write to pidfile '{path}'")]
    ShortWrite {
        /// The pidfile path that received a short write.
        path: PathBuf,
    },
    /// A process-global pidfile is already installed; call
    /// [`super::close_daemon`] before installing another.
    #[error("a pidfile is already installed for this process")]
    AlreadyInstalled,
    /// A system call failed.
    #[error("system call failed for pidfile '{path}': {source}")]
    System {
        /// The pidfile path being operated on.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// The process-global pidfile singleton: an owned path plus the open,
/// locked file descriptor backing it.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    #[allow(dead_code, reason = "kept alive only to hold the whole-file write lock")]
    file: File,
}

static SINGLETON: OnceLock<Mutex<Option<PidFile>>> = OnceLock::new();

fn singleton() -> &'static Mutex<Option<PidFile>> {
    SINGLETON.get_or_init(|| Mutex::new(None))
}

impl PidFile {
    /// The pidfile's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(name: &str) -> Result<Self, PidFileError> {
        Self::create_at(&pidfile_path(name)?)
    }

    fn create_at(path: &Path) -> Result<Self, PidFileError> {
        let path = path.to_path_buf();
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(PIDFILE_MODE)
            .open(&path)
        {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)
                    .map_err(|source| PidFileError::System {
                        path: path.clone(),
                        source,
                    })?
            }
            Err(source) => {
                return Err(PidFileError::System {
                    path: path.clone(),
                    source,
                });
            }
        };

        lock_whole_file(&file, &path)?;

        let pid_line = format!("{}\n", getpid());
        let mut writer = &file;
        match writer.write(pid_line.as_bytes()) {
            Ok(written) if written == pid_line.len() => {}
            _ => {
                std::fs::remove_file(&path).ok();
                return Err(PidFileError::ShortWrite { path });
            }
        }

        tracing::info!(target: DAEMONIZER_TARGET, path = %path.display(), "pidfile installed");
        Ok(Self { path, file })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Acknowledged flaw, reproduced verbatim: if a third party has
        // already unlinked this path, this call silently no-ops and a
        // second daemon may already believe it owns the name.
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != io::ErrorKind::NotFound {
                tracing::warn!(target: DAEMONIZER_TARGET, path = %self.path.display(), %error, "failed to remove pidfile");
            }
        }
    }
}

fn pidfile_path(name: &str) -> Result<PathBuf, PidFileError> {
    let path = PathBuf::from(PID_DIR).join(format!("{name}.pid"));
    let max_len = max_path_len();
    if path.as_os_str().len() as u64 > max_len {
        return Err(PidFileError::PathTooLong { name: name.into() });
    }
    Ok(path)
}

fn lock_whole_file(file: &File, path: &Path) -> Result<(), PidFileError> {
    // SAFETY: a zeroed `flock` is valid; a whole-file write lock leaves
    // every other field at zero.
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = libc::F_WRLCK as libc::c_short;
    lock.l_whence = libc::SEEK_SET as libc::c_short;
    lock.l_start = 0;
    lock.l_len = 0;

    match fcntl(file.as_raw_fd(), FcntlArg::F_SETLK(&lock)) {
        Ok(_) => Ok(()),
        Err(Errno::EAGAIN | Errno::EACCES) => Err(PidFileError::AddressInUse {
            path: path.to_path_buf(),
        }),
        Err(errno) => Err(PidFileError::System {
            path: path.to_path_buf(),
            source: io::Error::from(errno),
        }),
    }
}

/// Creates and locks the pidfile for `name`, installing it as the
/// process-wide singleton. Fails with [`PidFileError::AlreadyInstalled`] if
/// a pidfile is already installed for this process.
pub(super) fn install(name: &str) -> Result<(), PidFileError> {
    #[allow(clippy::unwrap_used, reason = "poisoning only occurs after a panic while holding the singleton; there is no recovery path to fall back to")]
    let mut guard = singleton().lock().unwrap();
    if guard.is_some() {
        return Err(PidFileError::AlreadyInstalled);
    }
    *guard = Some(PidFile::create(name)?);
    Ok(())
}

/// Unlinks the pidfile (if any) and releases the lock by closing the
/// descriptor. Always succeeds, matching `daemon_close`'s unconditional
/// return of 0.
pub(super) fn close() {
    #[allow(clippy::unwrap_used, reason = "poisoning only occurs after a panic while holding the singleton; there is no recovery path to fall back to")]
    let mut guard = singleton().lock().unwrap();
    guard.take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::getpid;
    use std::sync::Mutex as StdMutex;

    // Pidfile installation is process-global state; serialize tests against it.
    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    #[test]
    fn install_then_close_round_trips() {
        #[allow(clippy::unwrap_used, reason = "test-only mutex, poisoning would indicate a prior test panic")]
        let _guard = TEST_LOCK.lock().unwrap();
        close();

        let dir = tempfile::tempdir().expect("tempdir");
        let name = format!("daemon-core-test-{}", getpid());
        let path = dir.path().join(format!("{name}.pid"));

        // install() always uses PID_DIR; exercise PidFile::create directly
        // against a temp path instead of the real /var/run.
        let pidfile = PidFile::create_at(&path).expect("create pidfile");
        assert!(path.exists());
        let content = std::fs::read_to_string(&path).expect("read pidfile");
        assert_eq!(content, format!("{}\n", getpid()));
        drop(pidfile);
        assert!(!path.exists());
    }
}
