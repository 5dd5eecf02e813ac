use std::any::type_name;
use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{DropPolicy, Result, SlotAllocatorBuilder, SlotTable};

/// A fixed-capacity pool of slots that hands out small integer handles.
///
/// Claiming a slot stores a payload in it and returns the slot's index, which acts as an opaque
/// handle until the slot is released again. Claim, release and lookup are O(1) and never
/// allocate memory after construction (though [`get()`][1] clones the payload). The list
/// snapshots and the `Display` dump walk the lists and allocate.
///
/// The allocator is designed to be shared between threads (typically via `Arc`). All methods
/// take `&self`; claims and releases are serialized by an internal lock, while lookups take a
/// shared form of the same lock so that they never observe a partially updated allocator.
/// Shared access is taken recursively, so lookups may be nested inside [`with()`][2].
///
/// # Slot reuse
///
/// Released slots are reused in LIFO order - the most recently released slot is the first one
/// handed out by the next claim. A cold allocator hands out slots in index order, starting from
/// zero.
///
/// Handles carry no generation information. Once a slot is released, its index may be handed
/// out again to a different payload and the allocator cannot tell the two apart.
///
/// # Payload access
///
/// Because payloads live behind a lock, references to them cannot be handed out directly. Use
/// [`get()`][1] to obtain a clone of a payload, or [`with()`][2] and [`with_mut()`][3] to run a
/// closure against the payload while the lock is held.
///
/// # Example
///
/// ```
/// use slot_allocator::SlotAllocator;
///
/// let slots = SlotAllocator::new(2);
///
/// let alice = slots.claim("Alice").unwrap();
/// let bob = slots.claim("Bob").unwrap();
///
/// // The allocator is full, so the next claim reports exhaustion.
/// assert_eq!(slots.claim("Charlie"), None);
///
/// assert_eq!(slots.get(alice), Some("Alice"));
///
/// slots.release(bob);
/// assert_eq!(slots.get(bob), None);
///
/// // The slot Bob used is reused first.
/// assert_eq!(slots.claim("Charlie"), Some(bob));
/// ```
///
/// [1]: Self::get
/// [2]: Self::with
/// [3]: Self::with_mut
pub struct SlotAllocator<T> {
    // Readers use `read_recursive()` so that a lookup nested in `with()` cannot block behind
    // a queued writer while the outer read guard is held.
    table: RwLock<SlotTable<T>>,

    // Fixed at construction, so readable without taking the lock.
    capacity: usize,
    drop_policy: DropPolicy,
}

impl<T> SlotAllocator<T> {
    pub(crate) fn new_inner(capacity: usize, drop_policy: DropPolicy) -> Self {
        debug!(
            capacity,
            ?drop_policy,
            payload_type = type_name::<T>(),
            "slot allocator created"
        );

        Self {
            table: RwLock::new(SlotTable::new(capacity, drop_policy)),
            capacity,
            drop_policy,
        }
    }

    /// Creates a new [`SlotAllocator`] with `capacity` slots and the default configuration.
    ///
    /// A capacity of zero is valid and yields an allocator on which every claim reports
    /// exhaustion.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::SlotAllocator;
    ///
    /// let slots = SlotAllocator::<u64>::new(128);
    ///
    /// assert_eq!(slots.capacity(), 128);
    /// assert!(slots.is_empty());
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Starts building a new [`SlotAllocator`] with a customized configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::{DropPolicy, SlotAllocator};
    ///
    /// let slots = SlotAllocator::<u64>::builder()
    ///     .capacity(8)
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    /// ```
    pub fn builder() -> SlotAllocatorBuilder<T> {
        SlotAllocatorBuilder::new()
    }

    /// The fixed number of slots in the allocator.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The drop policy the allocator was built with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// The number of currently claimed slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read_recursive().len()
    }

    /// Whether no slot is currently claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every slot is currently claimed, meaning that the next claim will report
    /// exhaustion unless a slot is released first.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.table.read_recursive().is_full()
    }

    /// Claims a free slot, stores `payload` in it and returns the index of the slot.
    ///
    /// Returns `None` if every slot is already claimed. In that case the allocator is not
    /// modified and `payload` is dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::SlotAllocator;
    ///
    /// let slots = SlotAllocator::new(1);
    ///
    /// assert_eq!(slots.claim('a'), Some(0));
    /// assert_eq!(slots.claim('b'), None);
    /// ```
    #[must_use = "the returned index is the only way to release the claimed slot"]
    pub fn claim(&self, payload: T) -> Option<usize> {
        let result = self.table.write().claim(payload);

        match result {
            Ok(index) => {
                trace!(index, "slot claimed");
                Some(index)
            }
            Err(payload) => {
                debug!(capacity = self.capacity, "slot allocator exhausted");

                // Payload destructors always run outside the lock.
                drop(payload);
                None
            }
        }
    }

    /// Releases a claimed slot, dropping its payload and making the slot available for reuse.
    ///
    /// Releasing a slot that is not currently claimed does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than the capacity of the allocator. Use
    /// [`try_release()`][1] to handle this case without panicking.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::SlotAllocator;
    ///
    /// let slots = SlotAllocator::new(4);
    ///
    /// let index = slots.claim(42).unwrap();
    /// slots.release(index);
    ///
    /// // Releasing again is harmless.
    /// slots.release(index);
    /// assert!(slots.is_empty());
    /// ```
    ///
    /// [1]: Self::try_release
    pub fn release(&self, index: usize) {
        if let Err(error) = self.try_release(index) {
            panic!("cannot release slot: {error}");
        }
    }

    /// Releases a claimed slot, dropping its payload and making the slot available for reuse.
    ///
    /// Returns `Ok(true)` if the slot was claimed and has now been released, or `Ok(false)` if
    /// the slot was not claimed, in which case nothing is modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`][crate::Error::IndexOutOfBounds] if `index` is not
    /// less than the capacity of the allocator.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::{Error, SlotAllocator};
    ///
    /// let slots = SlotAllocator::new(2);
    /// let index = slots.claim("payload").unwrap();
    ///
    /// assert_eq!(slots.try_release(index), Ok(true));
    /// assert_eq!(slots.try_release(index), Ok(false));
    /// assert_eq!(
    ///     slots.try_release(2),
    ///     Err(Error::IndexOutOfBounds {
    ///         index: 2,
    ///         capacity: 2
    ///     })
    /// );
    /// ```
    pub fn try_release(&self, index: usize) -> Result<bool> {
        let payload = self.table.write().release(index)?;

        match payload {
            Some(payload) => {
                trace!(index, "slot released");

                // Payload destructors always run outside the lock.
                drop(payload);
                Ok(true)
            }
            None => {
                trace!(index, "slot already free, release ignored");
                Ok(false)
            }
        }
    }

    /// Returns a clone of the payload stored in a claimed slot.
    ///
    /// Returns `None` if the slot is not claimed or if `index` is out of bounds.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::SlotAllocator;
    ///
    /// let slots = SlotAllocator::new(2);
    /// let index = slots.claim(String::from("hello")).unwrap();
    ///
    /// assert_eq!(slots.get(index).as_deref(), Some("hello"));
    /// assert_eq!(slots.get(1), None);
    /// assert_eq!(slots.get(1000), None);
    /// ```
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.with(index, T::clone)
    }

    /// Calls `f` with a shared reference to the payload stored in a claimed slot and returns
    /// its result.
    ///
    /// Returns `None` without calling `f` if the slot is not claimed or if `index` is out of
    /// bounds.
    ///
    /// The allocator stays locked for shared access while `f` runs. Lookups such as
    /// [`get()`][4], [`len()`][5] or nested `with()` calls on the same allocator are fine from
    /// within `f`, but calling [`claim()`][1], [`release()`][2] or [`with_mut()`][3] there will
    /// deadlock.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::SlotAllocator;
    ///
    /// let slots = SlotAllocator::new(2);
    /// let index = slots.claim(vec![1, 2, 3]).unwrap();
    ///
    /// assert_eq!(slots.with(index, |numbers| numbers.iter().sum::<i32>()), Some(6));
    /// ```
    ///
    /// [1]: Self::claim
    /// [2]: Self::release
    /// [3]: Self::with_mut
    /// [4]: Self::get
    /// [5]: Self::len
    pub fn with<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        let table = self.table.read_recursive();
        table.get(index).map(f)
    }

    /// Calls `f` with an exclusive reference to the payload stored in a claimed slot and
    /// returns its result.
    ///
    /// Returns `None` without calling `f` if the slot is not claimed or if `index` is out of
    /// bounds. The slot stays claimed under the same index.
    ///
    /// The allocator stays locked for exclusive access while `f` runs. Calling any method on
    /// the same allocator from within `f` will deadlock.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::SlotAllocator;
    ///
    /// let slots = SlotAllocator::new(2);
    /// let index = slots.claim(1).unwrap();
    ///
    /// slots.with_mut(index, |value| *value += 1);
    /// assert_eq!(slots.get(index), Some(2));
    /// ```
    pub fn with_mut<R>(&self, index: usize, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut table = self.table.write();
        table.get_mut(index).map(f)
    }

    /// Whether the slot at `index` is currently claimed. Out of bounds indexes are never
    /// claimed.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.table.read_recursive().get(index).is_some()
    }

    /// Returns a snapshot of the free slot indexes, in the order in which they will be claimed.
    ///
    /// # Example
    ///
    /// ```
    /// use slot_allocator::SlotAllocator;
    ///
    /// let slots = SlotAllocator::new(3);
    /// let first = slots.claim(()).unwrap();
    /// slots.release(first);
    ///
    /// assert_eq!(slots.free_indices(), vec![0, 1, 2]);
    /// ```
    #[must_use]
    pub fn free_indices(&self) -> Vec<usize> {
        self.table.read_recursive().free_indices()
    }

    /// Returns a snapshot of the claimed slot indexes, most recently claimed first.
    #[must_use]
    pub fn busy_indices(&self) -> Vec<usize> {
        self.table.read_recursive().busy_indices()
    }
}

impl<T> fmt::Debug for SlotAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("payload_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

/// Renders the free and claimed slot indexes in list order, e.g. `Free [0 2], Busy [3 1]`.
impl<T> fmt::Display for SlotAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.table.read_recursive(), f)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Weak};
    use std::thread;
    use std::time::Duration;

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use testing::with_watchdog;

    use super::*;

    assert_impl_all!(SlotAllocator<u32>: Send, Sync);
    assert_impl_all!(SlotAllocator<String>: Send, Sync);
    assert_impl_all!(SlotAllocator<Cell<u32>>: Send);
    assert_not_impl_any!(SlotAllocator<Cell<u32>>: Sync);
    assert_not_impl_any!(SlotAllocator<Rc<u32>>: Send, Sync);

    #[test]
    fn smoke_test() {
        let slots = SlotAllocator::new(3);

        let a = slots.claim(42).unwrap();
        let b = slots.claim(43).unwrap();
        let c = slots.claim(44).unwrap();

        assert_eq!(slots.get(a), Some(42));
        assert_eq!(slots.get(b), Some(43));
        assert_eq!(slots.get(c), Some(44));
        assert_eq!(slots.len(), 3);
        assert!(slots.is_full());

        slots.release(b);

        assert_eq!(slots.len(), 2);
        assert!(!slots.is_full());

        let d = slots.claim(45).unwrap();

        assert_eq!(d, b);
        assert_eq!(slots.get(a), Some(42));
        assert_eq!(slots.get(c), Some(44));
        assert_eq!(slots.get(d), Some(45));
    }

    #[test]
    fn four_slot_walkthrough() {
        let slots = SlotAllocator::new(4);

        assert_eq!(slots.claim('a'), Some(0));
        assert_eq!(slots.claim('b'), Some(1));
        assert_eq!(slots.claim('c'), Some(2));
        assert_eq!(slots.claim('d'), Some(3));

        assert_eq!(slots.claim('e'), None);

        slots.release(2);
        assert_eq!(slots.free_indices(), vec![2]);

        slots.release(0);
        assert_eq!(slots.free_indices(), vec![0, 2]);

        assert_eq!(slots.claim('f'), Some(0));
        assert_eq!(slots.get(0), Some('f'));

        slots.release(1);
        let len_after_first_release = slots.len();
        let free_after_first_release = slots.free_indices();
        let busy_after_first_release = slots.busy_indices();

        slots.release(1);
        assert_eq!(slots.len(), len_after_first_release);
        assert_eq!(slots.free_indices(), free_after_first_release);
        assert_eq!(slots.busy_indices(), busy_after_first_release);

        assert_eq!(slots.len(), 2);
        assert_eq!(slots.to_string(), "Free [1 2], Busy [0 3]");
    }

    #[test]
    fn exhaustion_after_capacity_distinct_claims() {
        const CAPACITY: usize = 16;

        let slots = SlotAllocator::new(CAPACITY);

        let indices = (0..CAPACITY)
            .map(|value| slots.claim(value).unwrap())
            .collect::<HashSet<_>>();

        assert_eq!(indices.len(), CAPACITY);
        assert!(indices.iter().all(|index| *index < CAPACITY));
        assert_eq!(slots.claim(CAPACITY), None);
        assert_eq!(slots.len(), CAPACITY);
    }

    #[test]
    fn zero_capacity_always_exhausted() {
        let slots = SlotAllocator::<u32>::new(0);

        assert_eq!(slots.claim(1), None);
        assert_eq!(slots.claim(2), None);
        assert!(slots.is_empty());
        assert!(slots.is_full());
        assert_eq!(slots.get(0), None);
    }

    #[test]
    fn exhausted_claim_drops_payload() {
        let slots = SlotAllocator::new(1);
        let payload = Arc::new(());

        _ = slots.claim(Arc::clone(&payload)).unwrap();
        assert_eq!(Arc::strong_count(&payload), 2);

        assert_eq!(slots.claim(Arc::clone(&payload)), None);
        assert_eq!(Arc::strong_count(&payload), 2);
    }

    #[test]
    fn release_drops_payload() {
        let slots = SlotAllocator::new(1);
        let payload = Arc::new(());

        let index = slots.claim(Arc::clone(&payload)).unwrap();
        slots.release(index);

        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn lookup_of_unclaimed_or_released_is_none() {
        let slots = SlotAllocator::new(3);

        assert_eq!(slots.get(0), None);
        assert!(!slots.contains(0));

        let index = slots.claim(7).unwrap();
        assert!(slots.contains(index));

        slots.release(index);
        assert_eq!(slots.get(index), None);
        assert!(!slots.contains(index));

        assert_eq!(slots.get(3), None);
        assert_eq!(slots.get(usize::MAX), None);
        assert!(!slots.contains(usize::MAX));
    }

    #[test]
    fn empty_like_payloads_are_claimed_slots() {
        let units = SlotAllocator::new(2);
        let index = units.claim(()).unwrap();
        assert_eq!(units.get(index), Some(()));
        assert_eq!(units.get(1), None);

        let options = SlotAllocator::<Option<u8>>::new(2);
        let index = options.claim(None).unwrap();
        assert_eq!(options.get(index), Some(None));
        assert_eq!(options.len(), 1);

        let zeros = SlotAllocator::new(2);
        let index = zeros.claim(0_u64).unwrap();
        assert_eq!(zeros.get(index), Some(0));
    }

    #[test]
    fn with_does_not_require_clone() {
        struct NotClone(u32);

        let slots = SlotAllocator::new(1);
        let index = slots.claim(NotClone(5)).unwrap();

        assert_eq!(slots.with(index, |value| value.0), Some(5));
        assert_eq!(slots.with(1, |value| value.0), None);
    }

    #[test]
    fn with_mut_keeps_slot_claimed() {
        let slots = SlotAllocator::new(2);
        let index = slots.claim(String::from("abc")).unwrap();

        let new_len = slots.with_mut(index, |value| {
            value.push('d');
            value.len()
        });

        assert_eq!(new_len, Some(4));
        assert_eq!(slots.get(index).as_deref(), Some("abcd"));
        assert_eq!(slots.busy_indices(), vec![index]);
        assert_eq!(slots.with_mut(1, |value| value.len()), None);
    }

    #[test]
    fn try_release_reports_out_of_bounds() {
        let slots = SlotAllocator::<u32>::new(2);

        assert_eq!(
            slots.try_release(2),
            Err(crate::Error::IndexOutOfBounds {
                index: 2,
                capacity: 2
            })
        );
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn release_out_of_bounds_panics() {
        let slots = SlotAllocator::<u32>::new(2);

        slots.release(2);
    }

    #[test]
    #[should_panic(expected = "must be empty when dropped")]
    fn drop_claimed_with_forbidden_to_drop_policy_panics() {
        let slots = SlotAllocator::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        _ = slots.claim(1).unwrap();
    }

    #[test]
    fn payload_drop_may_use_allocator() {
        struct Reentrant {
            slots: Weak<SlotAllocator<Reentrant>>,
            observed_len: Arc<AtomicUsize>,
        }

        impl Drop for Reentrant {
            fn drop(&mut self) {
                if let Some(slots) = self.slots.upgrade() {
                    self.observed_len.store(slots.len(), Ordering::Relaxed);
                }
            }
        }

        let slots = Arc::new(SlotAllocator::new(2));
        let observed_len = Arc::new(AtomicUsize::new(usize::MAX));

        let index = slots
            .claim(Reentrant {
                slots: Arc::downgrade(&slots),
                observed_len: Arc::clone(&observed_len),
            })
            .unwrap();

        slots.release(index);

        assert_eq!(observed_len.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn debug_reports_configuration() {
        let slots = SlotAllocator::<u32>::new(4);
        _ = slots.claim(1).unwrap();

        let debug = format!("{slots:?}");

        assert!(debug.contains("capacity: 4"));
        assert!(debug.contains("len: 1"));
        assert!(debug.contains("MayDropItems"));
    }

    #[test]
    fn lookup_nested_in_with_does_not_wait_for_queued_writer() {
        with_watchdog(|| {
            let slots = Arc::new(SlotAllocator::new(2));
            let index = slots.claim(7).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let writer = thread::spawn({
                let slots = Arc::clone(&slots);
                let barrier = Arc::clone(&barrier);

                move || {
                    barrier.wait();
                    slots.claim(8).unwrap()
                }
            });

            let observed = slots.with(index, |value| {
                barrier.wait();

                // Give the writer time to queue up behind our read guard.
                thread::sleep(Duration::from_millis(200));

                (*value, slots.len(), slots.get(index), slots.contains(index))
            });

            assert_eq!(observed, Some((7, 1, Some(7), true)));

            let claimed = writer.join().unwrap();
            assert_eq!(slots.get(claimed), Some(8));
            assert_eq!(slots.len(), 2);
        });
    }

    #[test]
    fn multithreaded_via_arc() {
        let slots = Arc::new(SlotAllocator::new(3));

        let a = slots.claim(42).unwrap();
        let b = slots.claim(43).unwrap();
        let c = slots.claim(44).unwrap();

        thread::spawn({
            let slots = Arc::clone(&slots);

            move || {
                slots.release(b);

                let d = slots.claim(45).unwrap();

                assert_eq!(slots.get(a), Some(42));
                assert_eq!(slots.get(c), Some(44));
                assert_eq!(slots.get(d), Some(45));
            }
        })
        .join()
        .unwrap();

        assert!(slots.is_full());
        assert_eq!(slots.get(b), Some(45));
    }
}
