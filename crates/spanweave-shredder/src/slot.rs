//! Per-slot state word and buffer descriptor.
//!
//! Every slot of the ring carries one packed `AtomicU64`:
//!
//! ```text
//!  63                              32 31                     8 7        0
//! +----------------------------------+------------------------+----------+
//! |  offset of last delimiter (u32)  |  lap tag (24 bits)     |  flags   |
//! +----------------------------------+------------------------+----------+
//! ```
//!
//! The lap tag is `sequence / capacity`, so a word left behind by an earlier
//! occupant of the same index never matches a later sequence number. All
//! claims are CAS transitions on the whole word. The remaining descriptor
//! fields (handle, size, first delimiter) are written while the slot is
//! `RESERVED` and published by the store that sets `ARRIVED`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;
use spanweave_types::{BufferHandle, DelimiterLayout, SequenceNumber, StagedBuffer};

const FLAG_BITS: u32 = 8;
const LAP_BITS: u32 = 24;
const LAP_MASK: u64 = (1 << LAP_BITS) - 1;
const LAST_SHIFT: u32 = 32;

bitflags! {
    /// Lifecycle bits of one slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SlotFlags: u8 {
        /// A registration owns the slot and is writing the descriptor.
        const RESERVED = 1 << 0;
        /// Descriptor published, visible to walkers.
        const ARRIVED = 1 << 1;
        /// The buffer contains at least one tuple delimiter.
        const HAS_DELIMITER = 1 << 2;
        /// The trailing fragment is known (last delimiter offset set, or no
        /// delimiter at all).
        const TRAILING_READY = 1 << 3;
        /// The fragment before the first delimiter was handed out.
        const LEADING_CLAIMED = 1 << 4;
        /// The fragment after the last delimiter was handed out.
        const TRAILING_CLAIMED = 1 << 5;
    }
}

impl SlotFlags {
    /// Both sides handed out: the slot may be recycled.
    pub const TERMINAL: Self = Self::ARRIVED
        .union(Self::LEADING_CLAIMED)
        .union(Self::TRAILING_CLAIMED);
}

/// Lap tag of `sequence` for a ring of `capacity` slots.
#[inline]
pub fn lap_of(sequence: SequenceNumber, capacity: usize) -> u32 {
    ((sequence.get() / capacity as u64) & LAP_MASK) as u32
}

/// Decoded copy of a slot state word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWord(u64);

impl SlotWord {
    pub const fn new(lap: u32, flags: SlotFlags, last_delimiter: u32) -> Self {
        Self(
            ((last_delimiter as u64) << LAST_SHIFT)
                | (((lap as u64) & LAP_MASK) << FLAG_BITS)
                | flags.bits() as u64,
        )
    }

    /// Word of a slot no registration has touched in lap `lap`.
    pub const fn vacant(lap: u32) -> Self {
        Self::new(lap, SlotFlags::empty(), 0)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn lap(self) -> u32 {
        ((self.0 >> FLAG_BITS) & LAP_MASK) as u32
    }

    pub const fn flags(self) -> SlotFlags {
        SlotFlags::from_bits_truncate(self.0 as u8)
    }

    pub const fn last_delimiter(self) -> u32 {
        (self.0 >> LAST_SHIFT) as u32
    }

    pub const fn with_flags(self, flags: SlotFlags) -> Self {
        Self::new(self.lap(), self.flags().union(flags), self.last_delimiter())
    }

    pub const fn without_flags(self, flags: SlotFlags) -> Self {
        Self::new(
            self.lap(),
            self.flags().difference(flags),
            self.last_delimiter(),
        )
    }

    pub const fn with_lap(self, lap: u32) -> Self {
        Self::new(lap, self.flags(), self.last_delimiter())
    }

    /// Published in lap `lap`.
    pub fn arrived_in(self, lap: u32) -> bool {
        self.lap() == lap && self.flags().contains(SlotFlags::ARRIVED)
    }

    /// Registered or being registered in lap `lap`.
    pub fn occupied_in(self, lap: u32) -> bool {
        self.lap() == lap
            && self
                .flags()
                .intersects(SlotFlags::ARRIVED | SlotFlags::RESERVED)
    }

    pub fn is_terminal_in(self, lap: u32) -> bool {
        self.lap() == lap && self.flags().contains(SlotFlags::TERMINAL)
    }

    pub fn has_delimiter(self) -> bool {
        self.flags().contains(SlotFlags::HAS_DELIMITER)
    }
}

/// Outcome of publishing a lazily discovered last delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPublish {
    /// This call set the offset.
    Published(SlotWord),
    /// The same offset was already set.
    AlreadySet(SlotWord),
    /// A different offset was already set.
    Conflict { existing: u32 },
}

/// One ring slot.
#[derive(Debug)]
pub struct Slot {
    state: AtomicU64,
    handle: AtomicU64,
    size_in_bytes: AtomicU32,
    first_delimiter: AtomicU32,
}

impl Slot {
    pub fn vacant(lap: u32) -> Self {
        Self {
            state: AtomicU64::new(SlotWord::vacant(lap).raw()),
            handle: AtomicU64::new(0),
            size_in_bytes: AtomicU32::new(0),
            first_delimiter: AtomicU32::new(0),
        }
    }

    /// Copy of this slot re-tagged for a new lap. Only used while the ring
    /// is exclusively locked.
    pub fn relocated(&self, lap: u32) -> Self {
        let word = self.load().with_lap(lap);
        Self {
            state: AtomicU64::new(word.raw()),
            handle: AtomicU64::new(self.handle.load(Ordering::Relaxed)),
            size_in_bytes: AtomicU32::new(self.size_in_bytes.load(Ordering::Relaxed)),
            first_delimiter: AtomicU32::new(self.first_delimiter.load(Ordering::Relaxed)),
        }
    }

    #[inline]
    pub fn load(&self) -> SlotWord {
        SlotWord(self.state.load(Ordering::SeqCst))
    }

    /// Take ownership of the slot for lap `lap`.
    ///
    /// Fails with the observed word if the slot is already occupied in this
    /// lap, which means the sequence number was registered twice.
    pub fn reserve(&self, lap: u32) -> Result<(), SlotWord> {
        let reserved = SlotWord::new(lap, SlotFlags::RESERVED, 0);
        let mut current = self.load();
        loop {
            if current.occupied_in(lap) {
                return Err(current);
            }
            match self.state.compare_exchange_weak(
                current.raw(),
                reserved.raw(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = SlotWord(observed),
            }
        }
    }

    /// Write the descriptor of a reserved slot and make it visible.
    ///
    /// The `SeqCst` store pairs with the `SeqCst` loads of walkers: of two
    /// neighbours registering concurrently, at least one observes the other.
    pub fn publish(&self, lap: u32, buffer: &StagedBuffer, extra: SlotFlags) -> SlotWord {
        self.handle.store(buffer.handle().get(), Ordering::Relaxed);
        self.size_in_bytes.store(buffer.size_in_bytes(), Ordering::Relaxed);
        let mut flags = SlotFlags::ARRIVED | extra;
        let last = match buffer.layout() {
            DelimiterLayout::Absent => {
                flags |= SlotFlags::TRAILING_READY;
                self.first_delimiter.store(0, Ordering::Relaxed);
                0
            }
            DelimiterLayout::Partial { first } => {
                flags |= SlotFlags::HAS_DELIMITER;
                self.first_delimiter.store(first, Ordering::Relaxed);
                0
            }
            DelimiterLayout::Complete { first, last } => {
                flags |= SlotFlags::HAS_DELIMITER | SlotFlags::TRAILING_READY;
                self.first_delimiter.store(first, Ordering::Relaxed);
                last
            }
        };
        let word = SlotWord::new(lap, flags, last);
        self.state.store(word.raw(), Ordering::SeqCst);
        word
    }

    /// Atomically set `bits` if the slot is arrived in `lap` and none of
    /// `bits` is set yet.
    pub fn try_claim(&self, lap: u32, bits: SlotFlags) -> bool {
        let mut current = self.load();
        loop {
            if !current.arrived_in(lap) || current.flags().intersects(bits) {
                return false;
            }
            match self.state.compare_exchange_weak(
                current.raw(),
                current.with_flags(bits).raw(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = SlotWord(observed),
            }
        }
    }

    /// Undo a claim made by [`Slot::try_claim`].
    pub fn release_claim(&self, lap: u32, bits: SlotFlags) -> bool {
        let mut current = self.load();
        loop {
            if !current.arrived_in(lap) || !current.flags().contains(bits) {
                return false;
            }
            match self.state.compare_exchange_weak(
                current.raw(),
                current.without_flags(bits).raw(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = SlotWord(observed),
            }
        }
    }

    /// Set the last delimiter offset of a slot registered with a partial
    /// layout. Happens at most once per lap.
    pub fn publish_last_delimiter(&self, lap: u32, last: u32) -> OffsetPublish {
        let mut current = self.load();
        loop {
            debug_assert!(current.arrived_in(lap) && current.has_delimiter());
            if current.flags().contains(SlotFlags::TRAILING_READY) {
                let existing = current.last_delimiter();
                return if existing == last {
                    OffsetPublish::AlreadySet(current)
                } else {
                    OffsetPublish::Conflict { existing }
                };
            }
            let ready = SlotWord::new(lap, current.flags() | SlotFlags::TRAILING_READY, last);
            match self.state.compare_exchange_weak(
                current.raw(),
                ready.raw(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return OffsetPublish::Published(ready),
                Err(observed) => current = SlotWord(observed),
            }
        }
    }

    /// Rebuild the descriptor of an arrived slot.
    ///
    /// `word` must have been loaded from this slot with `arrived_in` true;
    /// descriptor fields never change while the slot stays in that lap.
    pub fn descriptor(&self, sequence: SequenceNumber, word: SlotWord) -> StagedBuffer {
        let layout = if !word.has_delimiter() {
            DelimiterLayout::Absent
        } else if word.flags().contains(SlotFlags::TRAILING_READY) {
            DelimiterLayout::Complete {
                first: self.first_delimiter.load(Ordering::Relaxed),
                last: word.last_delimiter(),
            }
        } else {
            DelimiterLayout::Partial {
                first: self.first_delimiter.load(Ordering::Relaxed),
            }
        };
        StagedBuffer::new(
            sequence,
            BufferHandle::new(self.handle.load(Ordering::Relaxed)),
            self.size_in_bytes.load(Ordering::Relaxed),
            layout,
        )
    }
}
