//! A thread-safe ordered sequence with a single internal iterator, used as
//! the basic container throughout this crate.
//!
//! Grounded on `libslack/list.h`'s List/Lister API surface, reimplemented
//! per spec.md §9's design notes: generic over element type instead of
//! `void *`, an attached [`Locker`] trait object instead of a
//! struct-of-function-pointers, and the external and internal iterators
//! bound to RAII lock guards instead of an explicit `list_release`/
//! `list_break` call a caller can forget to make.

pub mod locker;
mod iter;

use std::cell::UnsafeCell;
use std::sync::Arc;

use thiserror::Error;

pub use iter::{ExternalIter, InternalIter};
pub use locker::{Locker, LockMode, MutexLocker, NullLocker, RwLockLocker};

/// Sequences never shrink their backing storage below this many elements,
/// matching the original `list_create`'s `LIST_MIN_SIZE` floor.
pub const MIN_CAPACITY: usize = 4;

/// Errors surfaced by [`Sequence`] operations.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SequenceError {
    /// `index` is not a valid position for this operation.
    #[error("index {index} out of bounds for length {length}")]
    OutOfBounds {
        /// The rejected index.
        index: usize,
        /// The sequence's length at the time of the call.
        length: usize,
    },
    /// `start..end` is not a valid range for this operation.
    #[error("range {start}..{end} out of bounds for length {length}")]
    RangeOutOfBounds {
        /// The rejected range's start.
        start: usize,
        /// The rejected range's end.
        end: usize,
        /// The sequence's length at the time of the call.
        length: usize,
    },
}

/// The result type every mutating [`Sequence`] operation returns.
pub type SequenceResult<T> = Result<T, SequenceError>;

/// A dynamically sized, optionally synchronized ordered sequence of owned
/// elements.
///
/// Capacity is a power of two no smaller than [`MIN_CAPACITY`]; it doubles
/// when an insertion would exceed it and halves (never below the floor)
/// once occupancy drops under half of it, per spec.md §3's sizing
/// invariant. The backing store is a `Vec<T>`; grow and shrink targets are
/// computed and applied explicitly so the two operations stay
/// distinguishable from `Vec`'s own amortized growth policy.
///
/// All access goes through the attached [`Locker`] (if any): `None` makes
/// every operation single-threaded and lock-free, matching a `NULL` locker
/// in the original.
pub struct Sequence<T> {
    data: UnsafeCell<Vec<T>>,
    locker: Option<Arc<dyn Locker>>,
}

// SAFETY: every read of `data` goes through `read_guard`, every write
// through `write_guard`; both consult `locker` before touching the
// `UnsafeCell`. A `Sequence` built with `locker: None` is, per spec.md §5,
// single-threaded by caller discipline — sharing one across threads without
// a real `Locker` attached is a logic error the original C library does not
// catch at compile time either.
unsafe impl<T: Send> Send for Sequence<T> {}
unsafe impl<T: Send> Sync for Sequence<T> {}

impl<T> std::fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("len", &self.len())
            .field("locked", &self.locker.is_some())
            .finish()
    }
}

struct ReadGuard<'a, T> {
    seq: &'a Sequence<T>,
}

impl<'a, T> ReadGuard<'a, T> {
    fn get(&self) -> &'a Vec<T> {
        // SAFETY: `locker` (if attached) holds at least shared access for
        // the lifetime of this guard; no write guard can be live at the
        // same time.
        unsafe { &*self.seq.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(locker) = &self.seq.locker {
            locker.release(LockMode::Read);
        }
    }
}

struct WriteGuard<'a, T> {
    seq: &'a Sequence<T>,
}

impl<'a, T> WriteGuard<'a, T> {
    fn get(&mut self) -> &'a mut Vec<T> {
        // SAFETY: `locker` (if attached) holds exclusive access for the
        // lifetime of this guard; no other guard can be live at the same
        // time.
        unsafe { &mut *self.seq.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(locker) = &self.seq.locker {
            locker.release(LockMode::Write);
        }
    }
}

impl<T> Sequence<T> {
    fn read_guard(&self) -> ReadGuard<'_, T> {
        if let Some(locker) = &self.locker {
            locker.acquire(LockMode::Read);
        }
        ReadGuard { seq: self }
    }

    fn write_guard(&self) -> WriteGuard<'_, T> {
        if let Some(locker) = &self.locker {
            locker.acquire(LockMode::Write);
        }
        WriteGuard { seq: self }
    }

    /// Creates an empty sequence with no locker attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: UnsafeCell::new(Vec::with_capacity(MIN_CAPACITY)),
            locker: None,
        }
    }

    /// Creates an empty sequence synchronized by `locker`.
    #[must_use]
    pub fn with_locker(locker: Arc<dyn Locker>) -> Self {
        Self {
            data: UnsafeCell::new(Vec::with_capacity(MIN_CAPACITY)),
            locker: Some(locker),
        }
    }

    /// Creates a sequence pre-populated with `items` and no locker attached.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        let mut data = items;
        Self::rebalance(&mut data);
        Self {
            data: UnsafeCell::new(data),
            locker: None,
        }
    }

    /// Creates a sequence pre-populated with `items`, synchronized by
    /// `locker`.
    #[must_use]
    pub fn from_vec_with_locker(items: Vec<T>, locker: Arc<dyn Locker>) -> Self {
        let mut data = items;
        Self::rebalance(&mut data);
        Self {
            data: UnsafeCell::new(data),
            locker: Some(locker),
        }
    }

    /// Creates a sequence from an arbitrary pack of initial elements,
    /// matching the original's variadic `list_create(destroy, item, ...)`
    /// constructor.
    #[must_use]
    pub fn from_elements(items: impl IntoIterator<Item = T>) -> Self {
        Self::from_vec(items.into_iter().collect())
    }

    /// Deep-copies every element of `source` through `copier` into a new,
    /// independently owned sequence with no locker attached. Copying
    /// between two owning sequences always requires an explicit copier;
    /// there is no implicit `Clone`-based shortcut, matching spec.md's
    /// ownership invariants for copies.
    pub fn deep_copy_from(source: &Sequence<T>, copier: impl Fn(&T) -> T) -> Self {
        let guard = source.read_guard();
        let copied: Vec<T> = guard.get().iter().map(|item| copier(item)).collect();
        Self::from_vec(copied)
    }

    /// The number of elements currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_guard().get().len()
    }

    /// True iff the sequence holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_guard().get().is_empty()
    }

    /// The index of the last element, or `-1` if the sequence is empty,
    /// matching the original `list_last`'s sentinel.
    #[must_use]
    pub fn last_index(&self) -> isize {
        let len = self.len();
        if len == 0 {
            -1
        } else {
            #[allow(
                clippy::cast_possible_wrap,
                reason = "sequence lengths never approach isize::MAX"
            )]
            {
                (len - 1) as isize
            }
        }
    }

    /// A clone of the element at `index`, or the out-of-bounds error.
    pub fn get(&self, index: usize) -> SequenceResult<T>
    where
        T: Clone,
    {
        let guard = self.read_guard();
        let length = guard.get().len();
        guard
            .get()
            .get(index)
            .cloned()
            .ok_or(SequenceError::OutOfBounds { index, length })
    }

    /// Inserts `value` at `index`, shifting everything at or after `index`
    /// one place to the right. `index == len()` appends.
    pub fn insert(&self, index: usize, value: T) -> SequenceResult<()> {
        let mut guard = self.write_guard();
        let data = guard.get();
        let length = data.len();
        if index > length {
            return Err(SequenceError::OutOfBounds { index, length });
        }
        data.insert(index, value);
        Self::rebalance(data);
        Ok(())
    }

    /// Replaces the element at `index`, returning the element it displaced.
    pub fn replace(&self, index: usize, value: T) -> SequenceResult<T> {
        let mut guard = self.write_guard();
        let data = guard.get();
        let length = data.len();
        let Some(slot) = data.get_mut(index) else {
            return Err(SequenceError::OutOfBounds { index, length });
        };
        Ok(std::mem::replace(slot, value))
    }

    /// Removes and returns the element at `index`, shifting everything
    /// after it one place to the left.
    pub fn remove(&self, index: usize) -> SequenceResult<T> {
        let mut guard = self.write_guard();
        let data = guard.get();
        let length = data.len();
        if index >= length {
            return Err(SequenceError::OutOfBounds { index, length });
        }
        let removed = data.remove(index);
        Self::rebalance(data);
        Ok(removed)
    }

    /// Removes every element in `range`, discarding them.
    pub fn remove_range(&self, range: std::ops::Range<usize>) -> SequenceResult<()> {
        let mut guard = self.write_guard();
        let data = guard.get();
        Self::check_range(data.len(), &range)?;
        data.drain(range);
        Self::rebalance(data);
        Ok(())
    }

    /// Removes every element in `range` and returns it as a new, owning
    /// sequence — the original's `list_splice`.
    pub fn splice(&self, range: std::ops::Range<usize>) -> SequenceResult<Sequence<T>> {
        let mut guard = self.write_guard();
        let data = guard.get();
        Self::check_range(data.len(), &range)?;
        let removed: Vec<T> = data.drain(range).collect();
        Self::rebalance(data);
        Ok(Sequence::from_vec(removed))
    }

    /// Copies every element in `range` into a new, owning sequence, leaving
    /// this sequence unchanged.
    pub fn extract_range(&self, range: std::ops::Range<usize>) -> SequenceResult<Sequence<T>>
    where
        T: Clone,
    {
        let guard = self.read_guard();
        let data = guard.get();
        let length = data.len();
        Self::check_range(length, &range)?;
        let Some(slice) = data.get(range.clone()) else {
            return Err(SequenceError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                length,
            });
        };
        Ok(Sequence::from_vec(slice.to_vec()))
    }

    /// Inserts every element of `other` at `index`, consuming `other`.
    pub fn insert_sequence(&self, index: usize, other: Sequence<T>) -> SequenceResult<()> {
        let items = other.into_vec();
        let mut guard = self.write_guard();
        let data = guard.get();
        let length = data.len();
        if index > length {
            return Err(SequenceError::OutOfBounds { index, length });
        }
        let tail = data.split_off(index);
        data.extend(items);
        data.extend(tail);
        Self::rebalance(data);
        Ok(())
    }

    /// Replaces every element in `range` with the elements of `other`,
    /// consuming `other`. The replacement need not be the same length as
    /// the range it replaces.
    pub fn replace_range_with_sequence(
        &self,
        range: std::ops::Range<usize>,
        other: Sequence<T>,
    ) -> SequenceResult<()> {
        let items = other.into_vec();
        let mut guard = self.write_guard();
        let data = guard.get();
        Self::check_range(data.len(), &range)?;
        let displaced = data.splice(range, items);
        drop(displaced);
        Self::rebalance(data);
        Ok(())
    }

    /// Appends `value` to the end.
    pub fn push(&self, value: T) {
        let mut guard = self.write_guard();
        let data = guard.get();
        data.push(value);
        Self::rebalance(data);
    }

    /// Removes and returns the last element, if any.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.write_guard();
        let data = guard.get();
        let popped = data.pop();
        Self::rebalance(data);
        popped
    }

    /// Removes and returns the first element, if any.
    pub fn shift(&self) -> Option<T> {
        let mut guard = self.write_guard();
        let data = guard.get();
        if data.is_empty() {
            return None;
        }
        let removed = data.remove(0);
        Self::rebalance(data);
        Some(removed)
    }

    /// Inserts `value` at the front.
    pub fn unshift(&self, value: T) {
        let mut guard = self.write_guard();
        let data = guard.get();
        data.insert(0, value);
        Self::rebalance(data);
    }

    /// Sorts in place using `compare`.
    pub fn sort(&self, mut compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        let mut guard = self.write_guard();
        guard.get().sort_by(|a, b| compare(a, b));
    }

    /// Invokes `f` once per element, in order, for its side effects.
    pub fn apply(&self, mut f: impl FnMut(&T)) {
        let guard = self.read_guard();
        for item in guard.get() {
            f(item);
        }
    }

    /// Builds a new, unlocked sequence by mapping every element through
    /// `f`.
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Sequence<U> {
        let guard = self.read_guard();
        let mapped: Vec<U> = guard.get().iter().map(|item| f(item)).collect();
        Sequence::from_vec(mapped)
    }

    /// Builds a new sequence holding a clone of every element for which
    /// `predicate` returns true.
    pub fn grep(&self, predicate: impl Fn(&T) -> bool) -> Sequence<T>
    where
        T: Clone,
    {
        let guard = self.read_guard();
        let matched: Vec<T> = guard
            .get()
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect();
        Sequence::from_vec(matched)
    }

    /// Searches for the first element at or after `*start` satisfying
    /// `predicate`. On a match, advances `*start` to just past it and
    /// returns its index; otherwise advances `*start` to the end and
    /// returns `None`. Matches the original `list_search`'s caller-held
    /// resume index.
    pub fn search(&self, start: &mut usize, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        let guard = self.read_guard();
        let data = guard.get();
        let from = (*start).min(data.len());
        for (offset, item) in data.iter().enumerate().skip(from) {
            if predicate(item) {
                *start = offset + 1;
                return Some(offset);
            }
        }
        *start = data.len();
        None
    }

    /// Builds a non-owning, borrowed view over every element currently
    /// held, holding the sequence's read lock for the view's lifetime.
    /// This is the "relinquish ownership" transition from spec.md §4.5:
    /// the resulting [`BorrowedSequence`] never runs the referents'
    /// destructors, since it only ever sees references into `self`.
    #[must_use]
    pub fn into_borrowed(&self) -> BorrowedSequence<'_, T> {
        let guard = self.read_guard();
        let items: Vec<&T> = guard.get().iter().collect();
        BorrowedSequence {
            items,
            _guard: Some(guard),
        }
    }

    /// Creates an explicit, caller-owned iterator over the sequence, write-
    /// locking it for the iterator's lifetime. Any number of these may
    /// exist over their lifetimes (serialized against each other and
    /// against [`InternalIter`] by the attached locker).
    #[must_use]
    pub fn external_iter(&self) -> ExternalIter<'_, T> {
        ExternalIter::new(self)
    }

    /// Creates the sequence's one internal iterator, write-locking it until
    /// the iterator is exhausted, explicitly stopped, or dropped. Per
    /// spec.md §4.5 this is conceptually a single per-sequence iterator
    /// created on first use; the RAII redesign (spec.md §9) makes that
    /// explicit at the construction call instead of implicitly on a
    /// sequence's first `has_next`.
    #[must_use]
    pub fn internal_iter(&self) -> InternalIter<'_, T> {
        InternalIter::new(self)
    }

    /// Consumes the sequence, returning its backing storage.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data.into_inner()
    }

    fn check_range(length: usize, range: &std::ops::Range<usize>) -> SequenceResult<()> {
        if range.start > range.end || range.end > length {
            return Err(SequenceError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                length,
            });
        }
        Ok(())
    }

    /// Applies the grow/shrink sizing discipline: capacity is a power of
    /// two no smaller than [`MIN_CAPACITY`]; it doubles past an occupancy
    /// overrun and halves (never below the floor) once occupancy drops
    /// under half of it. Division is expressed as a shift throughout to
    /// avoid rounding ambiguity at odd capacities, which cannot occur here
    /// since every capacity this function produces is itself a power of
    /// two.
    fn rebalance(data: &mut Vec<T>) {
        let len = data.len();
        let mut capacity = data.capacity().max(MIN_CAPACITY);

        if len > capacity {
            while len > capacity {
                capacity <<= 1;
            }
            Self::grow_to(data, capacity);
        } else if capacity > MIN_CAPACITY && len < (capacity >> 1) {
            let mut target = capacity;
            while target > MIN_CAPACITY && len < (target >> 1) {
                target >>= 1;
            }
            Self::shrink_to(data, target.max(MIN_CAPACITY));
        }
    }

    fn grow_to(data: &mut Vec<T>, capacity: usize) {
        if data.capacity() < capacity {
            data.reserve_exact(capacity - data.len());
        }
    }

    fn shrink_to(data: &mut Vec<T>, capacity: usize) {
        let mut replacement = Vec::with_capacity(capacity);
        replacement.append(data);
        *data = replacement;
    }
}

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A non-owning view over elements borrowed from elsewhere. Mutating
/// methods operate on the references themselves — reordering or dropping a
/// reference — without ever touching the referents' storage or drop glue.
///
/// The "take ownership of elements" transition from spec.md §4.5 becomes
/// [`BorrowedSequence::to_owned_with`], which deep-copies every referent
/// through a caller-supplied copier into a brand new, independently owned
/// [`Sequence`]. Rust's ownership rules reject any path that would let the
/// same elements be dropped from both sequences — exactly the double-free
/// spec.md's ownership invariants guard against by convention alone in the
/// original C.
pub struct BorrowedSequence<'a, T> {
    items: Vec<&'a T>,
    _guard: Option<ReadGuard<'a, T>>,
}

impl<T> std::fmt::Debug for BorrowedSequence<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BorrowedSequence")
            .field("len", &self.items.len())
            .finish()
    }
}

impl<'a, T> BorrowedSequence<'a, T> {
    /// An empty, standalone borrowed view not tied to any [`Sequence`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            _guard: None,
        }
    }

    /// The number of borrowed elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True iff the view holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The borrowed element at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a T> {
        self.items.get(index).copied()
    }

    /// Appends a borrowed reference.
    pub fn push(&mut self, value: &'a T) {
        self.items.push(value);
    }

    /// Removes and returns the last borrowed reference, if any.
    pub fn pop(&mut self) -> Option<&'a T> {
        self.items.pop()
    }

    /// Deep-copies every borrowed element through `copier` into a new,
    /// independently owned sequence.
    #[must_use]
    pub fn to_owned_with(&self, copier: impl Fn(&T) -> T) -> Sequence<T> {
        let owned: Vec<T> = self.items.iter().map(|item| copier(item)).collect();
        Sequence::from_vec(owned)
    }
}

impl<T> Default for BorrowedSequence<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn insert_preserves_neighbouring_elements() {
        let seq = Sequence::from_elements([1, 2, 4, 5]);
        seq.insert(2, 3).expect("insert");
        assert_eq!(seq.len(), 5);
        for (index, expected) in [1, 2, 3, 4, 5].into_iter().enumerate() {
            assert_eq!(seq.get(index).expect("get"), expected);
        }
    }

    #[test]
    fn insert_out_of_bounds_is_rejected() {
        let seq = Sequence::from_elements([1, 2, 3]);
        assert_eq!(
            seq.insert(10, 9),
            Err(SequenceError::OutOfBounds {
                index: 10,
                length: 3
            })
        );
    }

    #[test]
    fn remove_then_reinsert_round_trips() {
        let seq = Sequence::from_elements(["a", "b", "c", "d"]);
        let before: Vec<_> = (0..seq.len()).map(|i| seq.get(i).expect("get")).collect();
        let removed = seq.remove(1).expect("remove");
        seq.insert(1, removed).expect("reinsert");
        let after: Vec<_> = (0..seq.len()).map(|i| seq.get(i).expect("get")).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn destructors_run_exactly_once_per_live_element() {
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        {
            let seq = Sequence::from_elements((0..5).map(|_| DropCounter(Arc::clone(&count))));
            let _ = seq.remove(0).expect("remove");
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn splice_returns_removed_elements_as_new_sequence() {
        let seq = Sequence::from_elements([1, 2, 3, 4, 5]);
        let removed = seq.splice(1..3).expect("splice");
        assert_eq!(removed.into_vec(), vec![2, 3]);
        assert_eq!(seq.into_vec(), vec![1, 4, 5]);
    }

    #[test]
    fn extract_range_leaves_the_source_untouched() {
        let seq = Sequence::from_elements([1, 2, 3, 4]);
        let copy = seq.extract_range(1..3).expect("extract");
        assert_eq!(copy.into_vec(), vec![2, 3]);
        assert_eq!(seq.len(), 4);
    }

    #[test]
    fn grep_and_map_compose() {
        let seq = Sequence::from_elements(1..=10);
        let evens = seq.grep(|value| value % 2 == 0);
        let doubled = evens.map(|value| value * 2);
        assert_eq!(doubled.into_vec(), vec![4, 8, 12, 16, 20]);
    }

    #[test]
    fn search_resumes_from_the_caller_held_index() {
        let seq = Sequence::from_elements([1, 3, 5, 6, 7, 8]);
        let mut cursor = 0;
        let first = seq.search(&mut cursor, |value| value % 2 == 0);
        assert_eq!(first, Some(3));
        let second = seq.search(&mut cursor, |value| value % 2 == 0);
        assert_eq!(second, Some(5));
    }

    #[test]
    fn stack_and_queue_affordances_round_trip() {
        let seq: Sequence<i32> = Sequence::new();
        seq.push(1);
        seq.push(2);
        seq.unshift(0);
        assert_eq!(seq.into_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn pop_and_shift_on_empty_sequence_return_none() {
        let seq: Sequence<i32> = Sequence::new();
        assert_eq!(seq.pop(), None);
        assert_eq!(seq.shift(), None);
    }

    #[test]
    fn capacity_grows_and_shrinks_as_powers_of_two() {
        let seq: Sequence<i32> = Sequence::new();
        for value in 0..20 {
            seq.push(value);
        }
        for _ in 0..18 {
            seq.pop();
        }
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn borrowed_sequence_never_drops_referents() {
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let seq = Sequence::from_elements((0..3).map(|_| DropCounter(Arc::clone(&count))));
        {
            let borrowed = seq.into_borrowed();
            assert_eq!(borrowed.len(), 3);
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(seq);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn to_owned_with_deep_copies_borrowed_elements() {
        let seq = Sequence::from_elements([String::from("a"), String::from("b")]);
        let borrowed = seq.into_borrowed();
        let owned = borrowed.to_owned_with(Clone::clone);
        assert_eq!(owned.into_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn internal_iterator_visits_every_element_in_order() {
        let seq = Sequence::from_elements([10, 20, 30]);
        let mut iter = seq.internal_iter();
        let mut seen = Vec::new();
        while iter.has_next() {
            seen.push(iter.next().expect("next while has_next is true"));
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn internal_iterator_remove_current_does_not_skip_the_next_element() {
        let seq = Sequence::from_elements([1, 2, 3, 4]);
        {
            let mut iter = seq.internal_iter();
            assert_eq!(iter.next(), Some(1));
            assert_eq!(iter.next(), Some(2));
            iter.remove_current();
            assert_eq!(iter.next(), Some(3));
        }
        assert_eq!(seq.into_vec(), vec![1, 3, 4]);
    }

    #[test]
    fn external_iterator_allows_early_stop_without_leaking_the_lock() {
        let seq = Sequence::with_locker(Arc::new(RwLockLocker::default()));
        seq.push(1);
        seq.push(2);
        {
            let mut iter = seq.external_iter();
            assert_eq!(iter.next(), Some(1));
            iter.stop();
        }
        // If `stop` had failed to release the write lock, this would
        // deadlock instead of returning.
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn concurrent_producer_consumer_and_readers_do_not_deadlock() {
        let seq: Arc<Sequence<i32>> = Arc::new(Sequence::with_locker(Arc::new(RwLockLocker::default())));

        let producer = {
            let seq = Arc::clone(&seq);
            std::thread::spawn(move || {
                for value in 0..1000 {
                    seq.unshift(value);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let mut iter = seq.internal_iter();
                        if iter.has_next() {
                            let _ = iter.next();
                        }
                        iter.stop();
                    }
                })
            })
            .collect();

        producer.join().expect("producer thread");
        for reader in readers {
            reader.join().expect("reader thread");
        }

        let mut consumed = Vec::new();
        while let Some(value) = seq.pop() {
            consumed.push(value);
        }
        assert_eq!(consumed, (0..1000).collect::<Vec<_>>());
    }
}
