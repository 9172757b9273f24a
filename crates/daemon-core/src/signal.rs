//! Deferred, ANSI-safe signal dispatch.
//!
//! The only code actually installed with the kernel is [`catcher`], which
//! does nothing but an atomic increment and return — the async-signal-safe
//! minimum POSIX allows. Arbitrary user callbacks run later, synchronously,
//! from [`dispatch_one`]/[`dispatch_all`] on the thread that calls them.
//! Grounded on `prog/sig.c`'s `signal_set_handler`/`signal_addset`/
//! `signal_received`/`signal_raise`/`signal_handle`/`signal_handle_all`,
//! installed via a raw `nix::sys::signal::sigaction` call rather than
//! `signal_hook::low_level::register`: the latter always installs with
//! `SA_RESTART`, which would make a blocking `waitpid` auto-restart instead
//! of returning `EINTR` on delivery, and gives callers no way to choose
//! otherwise. `sigaction` forwards the caller's `flags` to the kernel
//! unchanged, so a caller whose wait loop depends on `EINTR` can ask for
//! none.

use libc::c_int;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, sigaction, sigprocmask};
use thiserror::Error;

use crate::SIGNAL_TARGET;

/// The highest signal number this table tracks (inclusive), matching the
/// historical `NSIG` used by the original catcher's counter array.
const MAX_SIGNO: usize = 64;

/// Errors surfaced by the deferred signal dispatcher.
#[derive(Debug, Error)]
pub enum SignalError {
    /// `signo` is outside `[0, NSIG)`.
    #[error("signal number {signo} is out of range")]
    BadArgument {
        /// The out-of-range signal number supplied by the caller.
        signo: i32,
    },
    /// Installing the kernel-level catcher failed.
    #[error("failed to install handler for signal {signo}: {source}")]
    Install {
        /// The signal the caller tried to register a handler for.
        signo: i32,
        /// The underlying OS error.
        #[source]
        source: nix::errno::Errno,
    },
    /// Adjusting the process signal mask around dispatch failed.
    #[error("failed to adjust signal mask for signal {signo}: {source}")]
    Mask {
        /// The signal whose dispatch triggered the mask adjustment.
        signo: i32,
        /// The underlying OS error.
        #[source]
        source: nix::errno::Errno,
    },
    /// No handler is registered for `signo`.
    #[error("no handler registered for signal {signo}")]
    Unregistered {
        /// The signal that has no registered handler.
        signo: i32,
    },
}

/// A user callback invoked from [`dispatch_one`]/[`dispatch_all`], never
/// from signal-handler context. `Arc`-wrapped, not `Box`-wrapped, so
/// [`dispatch_one`] can clone a handle to it and release the registration
/// table's lock before the callback runs — a callback that itself calls
/// back into this module (registering a new handler, say) would otherwise
/// deadlock against its own dispatch.
pub type UserCallback = Arc<dyn Fn(i32) + Send + Sync>;

struct SignalEntry {
    callback: UserCallback,
    block_set: SigSet,
}

static COUNTERS: [AtomicU32; MAX_SIGNO] = {
    #[allow(
        clippy::declare_interior_mutable_const,
        reason = "each array element is independently constructed, not aliased"
    )]
    const ZERO: AtomicU32 = AtomicU32::new(0);
    [ZERO; MAX_SIGNO]
};

static TABLE: OnceLock<Mutex<[Option<SignalEntry>; MAX_SIGNO]>> = OnceLock::new();

fn table() -> &'static Mutex<[Option<SignalEntry>; MAX_SIGNO]> {
    TABLE.get_or_init(|| Mutex::new(std::array::from_fn(|_| None)))
}

fn check_range(signo: i32) -> Result<usize, SignalError> {
    if signo < 0 || signo as usize >= MAX_SIGNO {
        Err(SignalError::BadArgument { signo })
    } else {
        Ok(signo as usize)
    }
}

/// Registers `callback` as the deferred handler for `signo`, installing the
/// kernel-level catcher with `flags` forwarded unchanged. The kernel only
/// ever sees the async-signal-safe increment; `callback` runs later from
/// [`dispatch_one`]/[`dispatch_all`]. `extra_block_set` names additional
/// signals to block while `callback` runs; `signo` itself is always
/// included. Resets the delivery counter for `signo` to zero.
///
/// Callers whose wait loop depends on an interrupted blocking syscall (for
/// example `waitpid`) must pass `SaFlags::empty()`: `SaFlags::SA_RESTART`
/// makes the kernel transparently restart the interrupted call instead of
/// returning `EINTR`, which would starve the deferred dispatch this module
/// exists to drive.
pub fn set_handler(
    signo: Signal,
    flags: SaFlags,
    callback: impl Fn(i32) + Send + Sync + 'static,
    extra_block_set: &[Signal],
) -> Result<(), SignalError> {
    let idx = check_range(signo as i32)?;

    let mut block_set = SigSet::empty();
    block_set.add(signo);
    for extra in extra_block_set {
        block_set.add(*extra);
    }

    let action = SigAction::new(SigHandler::Handler(catcher), flags, SigSet::empty());
    // SAFETY: `catcher` only performs an atomic fetch-add, the sole
    // operation POSIX guarantees is async-signal-safe.
    unsafe { sigaction(signo, &action) }.map_err(|source| SignalError::Install {
        signo: signo as i32,
        source,
    })?;

    if let Some(counter) = COUNTERS.get(idx) {
        counter.store(0, Ordering::SeqCst);
    }

    #[allow(clippy::unwrap_used, reason = "poisoning only occurs after a panic in another dispatch; there is no recovery path to fall back to")]
    let mut guard = table().lock().unwrap();
    let slot = guard
        .get_mut(idx)
        .ok_or(SignalError::BadArgument { signo: signo as i32 })?;
    *slot = Some(SignalEntry {
        callback: Arc::new(callback),
        block_set,
    });

    Ok(())
}

/// Adds `signo_blocked` to the block set used while dispatching
/// `signo_handled`. Must be called after [`set_handler`] has registered
/// `signo_handled`.
pub fn add_to_block_set(signo_handled: Signal, signo_blocked: Signal) -> Result<(), SignalError> {
    let idx = check_range(signo_handled as i32)?;
    #[allow(clippy::unwrap_used, reason = "poisoning only occurs after a panic in another dispatch; there is no recovery path to fall back to")]
    let mut guard = table().lock().unwrap();
    let entry = guard
        .get_mut(idx)
        .and_then(Option::as_mut)
        .ok_or(SignalError::Unregistered { signo: signo_handled as i32 })?;
    entry.block_set.add(signo_blocked);
    Ok(())
}

/// The async-signal-safe catcher. The only thing ever installed with the
/// kernel: a single atomic increment. A plain `extern "C" fn`, not a
/// closure, because `sigaction` installs one function pointer per signal
/// and relies on the kernel to pass the delivered signal number back in.
extern "C" fn catcher(raw_signo: c_int) {
    if let Ok(idx) = check_range(raw_signo)
        && let Some(counter) = COUNTERS.get(idx)
    {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns the number of deliveries of `signo` recorded since the last
/// dispatch.
pub fn received(signo: i32) -> Result<u32, SignalError> {
    let idx = check_range(signo)?;
    Ok(COUNTERS.get(idx).map_or(0, |counter| counter.load(Ordering::SeqCst)))
}

/// Synthetically increments `signo`'s counter as if it had been delivered.
/// Returns the new counter value.
pub fn raise(signo: i32) -> Result<u32, SignalError> {
    let idx = check_range(signo)?;
    Ok(COUNTERS
        .get(idx)
        .map_or(0, |counter| counter.fetch_add(1, Ordering::SeqCst) + 1))
}

/// Blocks `signo`'s block set, zeroes its counter, invokes the registered
/// callback once with `signo`, then restores the prior signal mask. If the
/// callback terminates the process, no restore occurs; that is intentional.
///
/// The registration table's lock is released before the callback runs, so
/// a callback that itself calls [`set_handler`], [`add_to_block_set`] or
/// [`dispatch_one`]/[`dispatch_all`] does not deadlock against its own
/// dispatch.
pub fn dispatch_one(signo: i32) -> Result<(), SignalError> {
    let idx = check_range(signo)?;

    let (callback, block_set) = {
        #[allow(clippy::unwrap_used, reason = "poisoning only occurs after a panic in another dispatch; there is no recovery path to fall back to")]
        let guard = table().lock().unwrap();
        let Some(entry) = guard.get(idx).and_then(Option::as_ref) else {
            // No handler was ever registered for this signal; there is
            // nothing to invoke. Clear the counter anyway so a stray
            // `raise` doesn't make `dispatch_all` retry this signo on
            // every future pass.
            if let Some(counter) = COUNTERS.get(idx) {
                counter.store(0, Ordering::SeqCst);
            }
            return Err(SignalError::Unregistered { signo });
        };
        (Arc::clone(&entry.callback), entry.block_set.clone())
    };

    let mut original = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&block_set), Some(&mut original))
        .map_err(|source| SignalError::Mask { signo, source })?;

    if let Some(counter) = COUNTERS.get(idx) {
        counter.store(0, Ordering::SeqCst);
    }
    tracing::debug!(target: SIGNAL_TARGET, signo, "dispatching signal");
    callback(signo);

    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&original), None)
        .map_err(|source| SignalError::Mask { signo, source })?;

    Ok(())
}

/// Calls [`dispatch_one`] for every signal number, in ascending order, whose
/// counter was non-zero at the moment of inspection. Deliveries that arrive
/// between two dispatch passes, or between inspecting and dispatching a
/// single signal, coalesce into at most one callback invocation per signal.
pub fn dispatch_all() {
    for signo in 0..MAX_SIGNO as i32 {
        let pending = COUNTERS
            .get(signo as usize)
            .is_some_and(|counter| counter.load(Ordering::SeqCst) != 0);
        if pending {
            dispatch_one(signo).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32 as TestCounter;

    #[test]
    fn raise_coalesces_into_one_dispatch() {
        let signo = Signal::SIGUSR2 as i32;
        let invocations = Arc::new(TestCounter::new(0));
        let recorded = Arc::clone(&invocations);
        set_handler(
            Signal::SIGUSR2,
            SaFlags::empty(),
            move |_| {
                recorded.fetch_add(1, Ordering::SeqCst);
            },
            &[],
        )
        .expect("register handler");

        raise(signo).expect("raise 1");
        raise(signo).expect("raise 2");
        raise(signo).expect("raise 3");
        assert_eq!(received(signo).expect("received"), 3);

        dispatch_one(signo).expect("dispatch");
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(received(signo).expect("received after dispatch"), 0);
    }

    #[rstest]
    #[case::negative(-1)]
    #[case::just_past_the_table(MAX_SIGNO as i32)]
    #[case::far_past_the_table(MAX_SIGNO as i32 + 100)]
    fn out_of_range_signal_is_rejected(#[case] signo: i32) {
        assert!(matches!(received(signo), Err(SignalError::BadArgument { .. })));
        assert!(matches!(raise(signo), Err(SignalError::BadArgument { .. })));
    }

    #[test]
    fn add_to_block_set_augments_an_already_registered_handler() {
        set_handler(Signal::SIGUSR1, SaFlags::empty(), |_| {}, &[]).expect("register handler");
        add_to_block_set(Signal::SIGUSR1, Signal::SIGHUP).expect("augment block set");

        #[allow(clippy::unwrap_used, reason = "test-only lock; poisoning would indicate a prior test panic")]
        let guard = table().lock().unwrap();
        let entry = guard
            .get(Signal::SIGUSR1 as usize)
            .and_then(Option::as_ref)
            .expect("handler was just registered");
        assert!(entry.block_set.contains(Signal::SIGHUP));
        assert!(entry.block_set.contains(Signal::SIGUSR1));
    }

    #[test]
    fn add_to_block_set_rejects_an_unregistered_signal() {
        let result = add_to_block_set(Signal::SIGWINCH, Signal::SIGHUP);
        assert!(matches!(result, Err(SignalError::Unregistered { .. })));
    }
}
