/// Determines how a [`SlotAllocator`][crate::SlotAllocator] treats payloads that are still
/// claimed when the allocator itself is dropped.
///
/// By default, remaining payloads are dropped together with the allocator.
///
/// # Examples
///
/// ```
/// use slot_allocator::{DropPolicy, SlotAllocator};
///
/// // The drop policy is set at construction time.
/// let slots = SlotAllocator::<u32>::builder()
///     .capacity(16)
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Claimed payloads are dropped when the allocator is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The allocator will panic if any slot is still claimed when it is dropped.
    ///
    /// Useful when every handle is expected to be released by the embedding system before
    /// teardown, so that a leaked handle is detected instead of silently discarded.
    MustNotDropItems,
}
