//! External and internal iterators over a [`super::Sequence`], both bound
//! to a write-lock guard for their lifetime so releasing the lock can never
//! be forgotten — the systems-language fix for the "forgot to call
//! `list_break`" deadlock documented in spec.md §9's design notes.

use super::{LockMode, Sequence};

/// An iterator created explicitly by the caller. Any number of these may
/// exist over their non-overlapping lifetimes; the attached locker
/// serializes them against each other and against [`InternalIter`], since
/// both hold a write lock for as long as they live.
///
/// Matches the original `list_create_iter`/`list_has_next`/`list_next`/
/// `list_remove_current`/`list_release` API, with `list_release` replaced
/// by [`Drop`] (or the explicit, infallible [`Self::stop`]).
pub struct ExternalIter<'seq, T> {
    seq: &'seq Sequence<T>,
    /// `None` before the first advance, matching the original's `-1`
    /// sentinel for "iteration not yet started".
    index: Option<usize>,
    locked: bool,
}

/// The sequence's single internal iterator: created on demand, holding the
/// write lock until it is exhausted, explicitly stopped, or dropped.
///
/// Mechanically identical to [`ExternalIter`]; kept as a distinct type
/// because spec.md §4.5 treats "the one internal iterator a sequence owns"
/// and "any number of external iterators a caller owns" as separate
/// vocabularies, even though the RAII redesign gives both the same
/// implementation underneath.
pub struct InternalIter<'seq, T> {
    inner: ExternalIter<'seq, T>,
}

impl<'seq, T> ExternalIter<'seq, T> {
    pub(super) fn new(seq: &'seq Sequence<T>) -> Self {
        if let Some(locker) = &seq.locker {
            locker.acquire(LockMode::Write);
        }
        Self {
            seq,
            index: None,
            locked: true,
        }
    }

    fn candidate(&self) -> usize {
        match self.index {
            Some(current) => current + 1,
            None => 0,
        }
    }

    /// True iff another element is available.
    #[must_use]
    pub fn has_next(&self) -> bool {
        // SAFETY: the write lock acquired in `new` is held for the life of
        // this iterator.
        let data = unsafe { &*self.seq.data.get() };
        self.candidate() < data.len()
    }

    /// Advances and returns a clone of the next element, or `None` if the
    /// sequence is exhausted.
    pub fn next(&mut self) -> Option<T>
    where
        T: Clone,
    {
        if !self.has_next() {
            return None;
        }
        let candidate = self.candidate();
        self.index = Some(candidate);
        // SAFETY: see `has_next`.
        let data = unsafe { &*self.seq.data.get() };
        data.get(candidate).cloned()
    }

    /// Removes the element most recently returned by [`Self::next`],
    /// stepping the iterator back one place so the following call to
    /// `next` does not skip the element that followed it. Returns `None`
    /// if `next` has not yet been called.
    pub fn remove_current(&mut self) -> Option<T> {
        let current = self.index?;
        // SAFETY: see `has_next`.
        let data = unsafe { &mut *self.seq.data.get() };
        if current >= data.len() {
            return None;
        }
        let removed = data.remove(current);
        self.index = current.checked_sub(1);
        Some(removed)
    }

    /// Ends the iteration early, releasing the lock immediately instead of
    /// waiting for [`Drop`]. Equivalent to the original `list_break`, made
    /// infallible to call since a forgotten `stop` is reclaimed by `Drop`
    /// regardless.
    pub fn stop(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.locked {
            if let Some(locker) = &self.seq.locker {
                locker.release(LockMode::Write);
            }
            self.locked = false;
        }
    }
}

impl<T> Drop for ExternalIter<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<'seq, T> InternalIter<'seq, T> {
    pub(super) fn new(seq: &'seq Sequence<T>) -> Self {
        Self {
            inner: ExternalIter::new(seq),
        }
    }

    /// True iff another element is available.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.inner.has_next()
    }

    /// Advances and returns a clone of the next element, or `None` if the
    /// sequence is exhausted.
    pub fn next(&mut self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.next()
    }

    /// Removes the element most recently returned by [`Self::next`]. See
    /// [`ExternalIter::remove_current`].
    pub fn remove_current(&mut self) -> Option<T> {
        self.inner.remove_current()
    }

    /// Ends the iteration early, releasing the write lock immediately.
    pub fn stop(self) {
        self.inner.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::RwLockLocker;
    use std::sync::Arc;

    #[test]
    fn external_iterator_has_next_is_false_on_an_empty_sequence() {
        let seq: Sequence<i32> = Sequence::new();
        let iter = seq.external_iter();
        assert!(!iter.has_next());
    }

    #[test]
    fn dropping_an_iterator_without_stop_still_releases_the_lock() {
        let seq = Sequence::with_locker(Arc::new(RwLockLocker::default()));
        seq.push(1);
        {
            let mut iter = seq.external_iter();
            let _ = iter.next();
        }
        // If the implicit `Drop` release had not run, this would deadlock.
        assert_eq!(seq.len(), 1);
    }
}
