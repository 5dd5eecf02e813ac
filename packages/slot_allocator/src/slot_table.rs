use std::any::type_name;
use std::{fmt, iter, thread};

use crate::{DropPolicy, Error, Result};

/// This is the unsynchronized backing storage of a `SlotAllocator`.
///
/// A fixed-capacity array of slots, each of which is either Free or Busy. Two intrusive
/// doubly-linked lists are threaded through the array using index-valued links: the Free list
/// holds every Free slot and the Busy list holds every Busy slot. Together the two lists
/// partition the whole index range `0..capacity`.
///
/// Both lists are used as stacks - new members are always linked in at the head. For the Free
/// list this means that the most recently released slot is the first one to be claimed again.
///
/// All list mutation goes through [`unlink()`][1] and [`link_front()`][2], which are the only
/// places where the link invariants are touched.
///
/// [1]: Self::unlink
/// [2]: Self::link_front
pub(crate) struct SlotTable<T> {
    /// Never resized after construction.
    slots: Box<[Slot<T>]>,

    /// Head of the Free list. `None` if every slot is Busy (or the capacity is zero).
    free_head: Option<usize>,

    /// Head of the Busy list. `None` if every slot is Free.
    busy_head: Option<usize>,

    /// Number of Busy slots, which is always the length of the Busy list.
    count: usize,

    drop_policy: DropPolicy,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlotState {
    Free,
    Busy,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum List {
    Free,
    Busy,
}

impl From<List> for SlotState {
    fn from(list: List) -> Self {
        match list {
            List::Free => Self::Free,
            List::Busy => Self::Busy,
        }
    }
}

struct Slot<T> {
    /// `Some` if and only if `state` is `Busy`. The state tag is the source of truth - a payload
    /// is never inspected to decide whether a slot is in use.
    payload: Option<T>,

    state: SlotState,

    // Neighbors within whichever list the slot is currently a member of.
    prev: Option<usize>,
    next: Option<usize>,
}

impl<T> SlotTable<T> {
    /// Creates a table with `capacity` slots, all Free and linked into the Free list in index
    /// order, with slot 0 at the head.
    #[must_use]
    pub(crate) fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        let slots = (0..capacity)
            .map(|index| Slot {
                payload: None,
                state: SlotState::Free,
                prev: index.checked_sub(1),
                next: index.checked_add(1).filter(|next| *next < capacity),
            })
            .collect::<Box<[_]>>();

        Self {
            slots,
            free_head: if capacity == 0 { None } else { Some(0) },
            busy_head: None,
            count: 0,
            drop_policy,
        }
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.free_head.is_none()
    }

    /// Moves the head of the Free list to the Busy list and stores `payload` in it.
    ///
    /// If there is no Free slot, the payload is handed back to the caller untouched and the
    /// table is not modified.
    pub(crate) fn claim(&mut self, payload: T) -> std::result::Result<usize, T> {
        #[cfg(debug_assertions)]
        self.integrity_check();

        let Some(index) = self.free_head else {
            return Err(payload);
        };

        self.unlink(index, List::Free);
        self.link_front(index, List::Busy);

        let slot = self.slot_mut(index);
        debug_assert_eq!(slot.state, SlotState::Free);
        slot.state = SlotState::Busy;
        slot.payload = Some(payload);

        self.count = self
            .count
            .checked_add(1)
            .expect("count is bounded by capacity, which fits in usize");

        Ok(index)
    }

    /// Moves a Busy slot back to the head of the Free list.
    ///
    /// Returns the payload that was stored in the slot, or `None` if the slot was already Free,
    /// in which case nothing is modified. The payload is returned rather than dropped so that
    /// the caller can drop it outside of any lock it holds.
    pub(crate) fn release(&mut self, index: usize) -> Result<Option<T>> {
        #[cfg(debug_assertions)]
        self.integrity_check();

        let capacity = self.capacity();
        let slot = self
            .slots
            .get(index)
            .ok_or(Error::IndexOutOfBounds { index, capacity })?;

        if slot.state == SlotState::Free {
            return Ok(None);
        }

        self.unlink(index, List::Busy);
        self.link_front(index, List::Free);

        let slot = self.slot_mut(index);
        slot.state = SlotState::Free;
        let payload = slot
            .payload
            .take()
            .expect("a Busy slot always holds a payload");

        self.count = self
            .count
            .checked_sub(1)
            .expect("the slot was Busy so count must be non-zero");

        Ok(Some(payload))
    }

    /// Returns the payload of a Busy slot. Free and out-of-range slots yield `None`.
    #[must_use]
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        let slot = self.slots.get(index)?;

        match slot.state {
            SlotState::Busy => Some(
                slot.payload
                    .as_ref()
                    .expect("a Busy slot always holds a payload"),
            ),
            SlotState::Free => None,
        }
    }

    /// Returns the payload of a Busy slot for in-place modification. Free and out-of-range
    /// slots yield `None`.
    #[must_use]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let slot = self.slots.get_mut(index)?;

        match slot.state {
            SlotState::Busy => Some(
                slot.payload
                    .as_mut()
                    .expect("a Busy slot always holds a payload"),
            ),
            SlotState::Free => None,
        }
    }

    /// Indexes of the Free list, head first. The first entry is the next slot to be claimed.
    #[must_use]
    pub(crate) fn free_indices(&self) -> Vec<usize> {
        self.list_indices(List::Free).collect()
    }

    /// Indexes of the Busy list, head first. The first entry is the most recently claimed slot.
    #[must_use]
    pub(crate) fn busy_indices(&self) -> Vec<usize> {
        self.list_indices(List::Busy).collect()
    }

    fn list_indices(&self, list: List) -> impl Iterator<Item = usize> + '_ {
        iter::successors(self.head(list), |index| self.slot(*index).next)
    }

    fn head(&self, list: List) -> Option<usize> {
        match list {
            List::Free => self.free_head,
            List::Busy => self.busy_head,
        }
    }

    fn head_mut(&mut self, list: List) -> &mut Option<usize> {
        match list {
            List::Free => &mut self.free_head,
            List::Busy => &mut self.busy_head,
        }
    }

    fn slot(&self, index: usize) -> &Slot<T> {
        let capacity = self.capacity();

        self.slots.get(index).unwrap_or_else(|| {
            panic!(
                "slot {index} index out of bounds in table of capacity {capacity} holding {}",
                type_name::<T>()
            )
        })
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot<T> {
        let capacity = self.capacity();

        self.slots.get_mut(index).unwrap_or_else(|| {
            panic!(
                "slot {index} index out of bounds in table of capacity {capacity} holding {}",
                type_name::<T>()
            )
        })
    }

    /// Detaches the slot from `list`, patching the links of its neighbors. If the slot was the
    /// head of the list, the head advances to the slot's successor.
    ///
    /// The slot must currently be a member of `list`.
    fn unlink(&mut self, index: usize, list: List) {
        let (prev, next) = {
            let slot = self.slot(index);
            (slot.prev, slot.next)
        };

        if let Some(next) = next {
            self.slot_mut(next).prev = prev;
        }

        if let Some(prev) = prev {
            self.slot_mut(prev).next = next;
        }

        let head = self.head_mut(list);
        if *head == Some(index) {
            *head = next;
        }

        let slot = self.slot_mut(index);
        slot.prev = None;
        slot.next = None;
    }

    /// Makes the slot the new head of `list`.
    ///
    /// The slot must not currently be a member of any list.
    fn link_front(&mut self, index: usize, list: List) {
        let old_head = self.head(list);

        if let Some(old_head) = old_head {
            self.slot_mut(old_head).prev = Some(index);
        }

        let slot = self.slot_mut(index);
        slot.prev = None;
        slot.next = old_head;

        *self.head_mut(list) = Some(index);
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let mut seen = vec![false; self.capacity()];

        let free_len = self.check_list(List::Free, &mut seen);
        let busy_len = self.check_list(List::Busy, &mut seen);

        assert!(
            free_len
                .checked_add(busy_len)
                .is_some_and(|total| total == self.capacity()),
            "Free list length {free_len} and Busy list length {busy_len} do not add up to capacity {} in table holding {}",
            self.capacity(),
            type_name::<T>()
        );

        assert!(
            busy_len == self.count,
            "self.count {} does not match the Busy list length {busy_len} in table holding {}",
            self.count,
            type_name::<T>()
        );
    }

    /// Walks one list, verifying membership, link symmetry and state tags. Returns its length.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    fn check_list(&self, list: List, seen: &mut [bool]) -> usize {
        let expected_state = SlotState::from(list);

        let mut len: usize = 0;
        let mut expected_prev = None;
        let mut cursor = self.head(list);

        while let Some(index) = cursor {
            let seen_entry = seen
                .get_mut(index)
                .expect("link points out of bounds of the slot array");

            assert!(
                !*seen_entry,
                "slot {index} reached twice while walking the {list:?} list in table holding {}",
                type_name::<T>()
            );
            *seen_entry = true;

            let slot = self.slot(index);

            assert!(
                slot.state == expected_state,
                "slot {index} is {:?} but is a member of the {list:?} list in table holding {}",
                slot.state,
                type_name::<T>()
            );

            assert!(
                slot.payload.is_some() == (slot.state == SlotState::Busy),
                "slot {index} payload presence does not match its {:?} state in table holding {}",
                slot.state,
                type_name::<T>()
            );

            assert!(
                slot.prev == expected_prev,
                "slot {index} prev link {:?} does not match its predecessor {expected_prev:?} in table holding {}",
                slot.prev,
                type_name::<T>()
            );

            len = len
                .checked_add(1)
                .expect("guarded by the seen check, so bounded by capacity");
            expected_prev = Some(index);
            cursor = slot.next;
        }

        len
    }
}

impl<T> fmt::Display for SlotTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Free [")?;
        write_indices(f, self.list_indices(List::Free))?;
        write!(f, "], Busy [")?;
        write_indices(f, self.list_indices(List::Busy))?;
        write!(f, "]")
    }
}

fn write_indices(f: &mut fmt::Formatter<'_>, indices: impl Iterator<Item = usize>) -> fmt::Result {
    for (position, index) in indices.enumerate() {
        if position > 0 {
            write!(f, " ")?;
        }

        write!(f, "{index}")?;
    }

    Ok(())
}

impl<T> Drop for SlotTable<T> {
    fn drop(&mut self) {
        // A second panic during unwinding would abort and hide the first one.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                self.count == 0,
                "dropped a slot table with {} claimed slots holding {} with a policy that says it must be empty when dropped",
                self.count,
                type_name::<T>()
            );
        }
    }
}
