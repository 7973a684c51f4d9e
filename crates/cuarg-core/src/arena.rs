//! Backing storage for packed kernel arguments.
//!
//! One zeroed block per packer, bump-allocated with a cursor that only moves
//! forward. Slots are packed back to back at their exact width: adjacent
//! arguments share the block, so a width error would corrupt a neighbour.

use crate::alloc::{RawAllocator, RawBlock, SystemAllocator};
use crate::param_type::MAX_SCALAR_WIDTH;
use crate::Result;

/// Location of one slot inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub offset: usize,
    pub width: usize,
}

/// A bump-pointer arena over a single [`RawBlock`].
pub struct Arena<A: RawAllocator = SystemAllocator> {
    block: RawBlock<A>,
    offset: usize,
}

impl<A: RawAllocator> Arena<A> {
    /// Create an arena with room for `slots` values of the widest scalar.
    pub fn for_slots(slots: usize, alloc: A) -> Result<Self> {
        let block = RawBlock::allocate_in(slots, MAX_SCALAR_WIDTH, alloc)?;
        Ok(Self { block, offset: 0 })
    }

    /// Reserve `width` bytes at the cursor.
    /// Returns `None` if the arena is exhausted.
    pub fn reserve(&mut self, width: usize) -> Option<SlotRef> {
        let end = self.offset.checked_add(width)?;
        if end > self.block.len() {
            return None;
        }
        let slot = SlotRef { offset: self.offset, width };
        self.offset = end;
        Some(slot)
    }

    pub fn slot(&self, slot: SlotRef) -> &[u8] {
        &self.block.as_slice()[slot.offset..slot.offset + slot.width]
    }

    pub fn slot_mut(&mut self, slot: SlotRef) -> &mut [u8] {
        &mut self.block.as_mut_slice()[slot.offset..slot.offset + slot.width]
    }

    /// Absolute address of a slot.
    pub fn address_of(&self, slot: SlotRef) -> usize {
        self.block.as_ptr() as usize + slot.offset
    }

    /// Current bytes used.
    pub fn used(&self) -> usize {
        self.offset
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_for_widest_slots() {
        let mut arena = Arena::for_slots(3, SystemAllocator).unwrap();
        assert_eq!(arena.used(), 0);
        for _ in 0..3 {
            assert!(arena.reserve(MAX_SCALAR_WIDTH).is_some());
        }
        assert!(arena.reserve(1).is_none());
        assert_eq!(arena.used(), 3 * MAX_SCALAR_WIDTH);
    }

    #[test]
    fn test_slots_are_packed_without_padding() {
        let mut arena = Arena::for_slots(4, SystemAllocator).unwrap();
        let a = arena.reserve(1).unwrap();
        let b = arena.reserve(4).unwrap();
        let c = arena.reserve(8).unwrap();
        assert_eq!((a.offset, b.offset, c.offset), (0, 1, 5));
        assert_eq!(arena.used(), 13);
        assert_eq!(arena.address_of(b), arena.address_of(a) + 1);
    }

    #[test]
    fn test_exhaustion() {
        let mut arena = Arena::for_slots(1, SystemAllocator).unwrap();
        assert!(arena.reserve(4).is_some());
        assert!(arena.reserve(8).is_none());
        assert!(arena.reserve(4).is_some());
        assert_eq!(arena.used(), 8);
    }

    #[test]
    fn test_writes_stay_in_slot() {
        let mut arena = Arena::for_slots(2, SystemAllocator).unwrap();
        let a = arena.reserve(2).unwrap();
        let b = arena.reserve(2).unwrap();
        arena.slot_mut(a).copy_from_slice(&[0xff, 0xff]);
        assert_eq!(arena.slot(b), &[0, 0]);
    }
}
