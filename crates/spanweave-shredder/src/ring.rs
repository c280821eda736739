use spanweave_types::SequenceNumber;

use crate::slot::{Slot, SlotWord, lap_of};

/// Fixed-size array of slots indexed by `sequence % capacity`.
#[derive(Debug)]
pub struct Ring {
    slots: Box<[Slot]>,
}

impl Ring {
    /// Ring whose window starts at `tail`.
    pub fn new(capacity: usize, tail: SequenceNumber) -> Self {
        let slots = (0..capacity as u64)
            .map(|offset| {
                let sequence = SequenceNumber::new(tail.get() + offset);
                (sequence, Slot::vacant(lap_of(sequence, capacity)))
            })
            .collect::<Vec<_>>();
        Self::from_placed(capacity, slots)
    }

    /// Build a ring from one slot per sequence number of a full window.
    fn from_placed(capacity: usize, mut placed: Vec<(SequenceNumber, Slot)>) -> Self {
        debug_assert_eq!(placed.len(), capacity);
        placed.sort_unstable_by_key(|(sequence, _)| sequence.get() % capacity as u64);
        Self {
            slots: placed.into_iter().map(|(_, slot)| slot).collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn lap(&self, sequence: SequenceNumber) -> u32 {
        lap_of(sequence, self.capacity())
    }

    #[inline]
    pub fn slot(&self, sequence: SequenceNumber) -> &Slot {
        &self.slots[(sequence.get() % self.capacity() as u64) as usize]
    }

    /// Load the word of `sequence` and report whether it belongs to it.
    #[inline]
    pub fn arrived(&self, sequence: SequenceNumber) -> Option<SlotWord> {
        let word = self.slot(sequence).load();
        word.arrived_in(self.lap(sequence)).then_some(word)
    }

    /// Whether `sequence` falls inside `[tail, tail + capacity)`.
    #[inline]
    pub fn covers(&self, tail: SequenceNumber, sequence: SequenceNumber) -> bool {
        sequence
            .distance_from(tail)
            .is_some_and(|distance| distance < self.capacity() as u64)
    }

    /// Copy of this ring with `new_capacity` slots.
    ///
    /// Every live slot of `[tail, tail + capacity)` moves to its new index
    /// and lap; the rest of the new window starts vacant. Callers hold the
    /// ring exclusively, so no slot is reserved mid-registration.
    pub fn grown(&self, new_capacity: usize, tail: SequenceNumber) -> Self {
        debug_assert!(new_capacity > self.capacity());
        let placed = (0..new_capacity as u64)
            .map(|offset| {
                let sequence = SequenceNumber::new(tail.get() + offset);
                let new_lap = lap_of(sequence, new_capacity);
                let slot = if self.covers(tail, sequence) && self.arrived(sequence).is_some() {
                    self.slot(sequence).relocated(new_lap)
                } else {
                    Slot::vacant(new_lap)
                };
                (sequence, slot)
            })
            .collect();
        Self::from_placed(new_capacity, placed)
    }
}
