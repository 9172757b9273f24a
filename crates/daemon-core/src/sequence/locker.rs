//! The locker seam: an opaque read-lock/write-lock/unlock handle that
//! [`super::Sequence`] consults before every read or write.
//!
//! Grounded on `libslack/locker.h`'s `Locker` struct: a fixed set of
//! function pointers (`rdlock`/`wrlock`/`unlock`) wrapping either a mutex or
//! a readers-writer lock. `unlock` is a single operation in the original —
//! it releases whichever kind of lock is currently held — so here it takes
//! the [`LockMode`] the matching `acquire` call used, rather than being two
//! separate methods.

use std::fmt;

use lock_api::{RawMutex as _, RawRwLock as _};
use parking_lot::{RawMutex, RawRwLock};

/// Which of the two lock modes a [`Locker`] call is acquiring or releasing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockMode {
    /// Shared access: any number of readers may hold this concurrently.
    Read,
    /// Exclusive access.
    Write,
}

/// An opaque locking handle attached to a [`super::Sequence`]. Implementors
/// need not be reentrant; [`super::Sequence`] never calls `acquire` twice
/// without an intervening `release` on the same thread.
pub trait Locker: fmt::Debug + Send + Sync {
    /// Blocks until `mode` access is granted.
    fn acquire(&self, mode: LockMode);
    /// Releases access most recently granted in `mode`.
    fn release(&self, mode: LockMode);
}

/// No locking at all. Attaching this to a sequence (or attaching none)
/// makes every operation single-threaded and lock-free, per spec.
#[derive(Debug, Default)]
pub struct NullLocker;

impl Locker for NullLocker {
    fn acquire(&self, _mode: LockMode) {}
    fn release(&self, _mode: LockMode) {}
}

/// Full mutual exclusion: readers and writers alike take the same lock.
/// Matches `locker_create_mutex`.
#[derive(Debug, Default)]
pub struct MutexLocker(RawMutex);

impl Locker for MutexLocker {
    fn acquire(&self, _mode: LockMode) {
        self.0.lock();
    }

    fn release(&self, _mode: LockMode) {
        // SAFETY: `release` is only ever called by the thread whose
        // preceding `acquire` call on this same `Locker` is still in effect.
        unsafe { self.0.unlock() };
    }
}

/// Readers may share the lock; writers are exclusive. Matches
/// `locker_create_rwlock`.
#[derive(Debug, Default)]
pub struct RwLockLocker(RawRwLock);

impl Locker for RwLockLocker {
    fn acquire(&self, mode: LockMode) {
        match mode {
            LockMode::Read => self.0.lock_shared(),
            LockMode::Write => self.0.lock_exclusive(),
        }
    }

    fn release(&self, mode: LockMode) {
        match mode {
            // SAFETY: `release` is only ever called by the thread whose
            // preceding `acquire(mode)` call on this same `Locker` is still
            // in effect, with the same `mode`.
            LockMode::Read => unsafe { self.0.unlock_shared() },
            LockMode::Write => unsafe { self.0.unlock_exclusive() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_locker_never_blocks() {
        let locker = NullLocker;
        locker.acquire(LockMode::Write);
        locker.acquire(LockMode::Read);
        locker.release(LockMode::Read);
        locker.release(LockMode::Write);
    }

    #[test]
    fn mutex_locker_round_trips() {
        let locker = MutexLocker::default();
        locker.acquire(LockMode::Write);
        locker.release(LockMode::Write);
        locker.acquire(LockMode::Read);
        locker.release(LockMode::Read);
    }

    #[test]
    fn rwlock_locker_allows_concurrent_reads() {
        let locker = RwLockLocker::default();
        locker.acquire(LockMode::Read);
        locker.acquire(LockMode::Read);
        locker.release(LockMode::Read);
        locker.release(LockMode::Read);
    }
}
