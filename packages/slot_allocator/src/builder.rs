use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{DropPolicy, SlotAllocator};

/// Builder for creating an instance of [`SlotAllocator`].
///
/// You only need to use this builder if you want to customize the allocator configuration
/// beyond its capacity. [`SlotAllocator::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use slot_allocator::{DropPolicy, SlotAllocator};
///
/// let slots = SlotAllocator::<String>::builder()
///     .capacity(64)
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
///
/// assert_eq!(slots.capacity(), 64);
/// ```
///
/// [1]: SlotAllocator::new
#[must_use]
pub struct SlotAllocatorBuilder<T> {
    capacity: usize,
    drop_policy: DropPolicy,

    _payload: PhantomData<T>,
}

impl<T> fmt::Debug for SlotAllocatorBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAllocatorBuilder")
            .field("payload_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> SlotAllocatorBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            drop_policy: DropPolicy::default(),
            _payload: PhantomData,
        }
    }

    /// Sets the fixed number of slots in the allocator.
    ///
    /// The capacity cannot be changed after the allocator is built. The default is zero, which
    /// yields an allocator on which every claim reports exhaustion.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the allocator. This governs how to treat
    /// payloads that are still claimed when the allocator is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_allocator::{DropPolicy, SlotAllocator};
    ///
    /// let slots = SlotAllocator::<u32>::builder()
    ///     .capacity(4)
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    ///
    /// let index = slots.claim(7).unwrap();
    ///
    /// // Everything must be released before the allocator goes away.
    /// slots.release(index);
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the slot allocator with the specified configuration.
    ///
    /// All slots start out free, with slot 0 being the first one to be claimed.
    #[must_use]
    pub fn build(self) -> SlotAllocator<T> {
        SlotAllocator::new_inner(self.capacity, self.drop_policy)
    }
}
