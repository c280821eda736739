use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-partition buffer sequence number.
///
/// Unique, strictly increasing and gapless within one partition. Assigned by
/// the transport layer before a buffer reaches the tracker; buffers may still
/// arrive at the tracker in any order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// First sequence number of a partition unless configured otherwise.
    pub const INITIAL: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The following sequence number, saturating at `u64::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The preceding sequence number, or `None` at zero.
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[must_use]
    pub const fn checked_add(self, delta: u64) -> Option<Self> {
        match self.0.checked_add(delta) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[must_use]
    pub const fn checked_sub(self, delta: u64) -> Option<Self> {
        match self.0.checked_sub(delta) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Distance from `earlier` to `self`, or `None` if `earlier` is later.
    #[must_use]
    pub const fn distance_from(self, earlier: Self) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for SequenceNumber {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Non-owning handle to a raw buffer held by a pool outside the tracker.
///
/// The pool must not recycle the storage behind a handle until the tracker
/// slot referencing it reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct BufferHandle(u64);

impl BufferHandle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours_saturate_at_the_edges() {
        assert_eq!(SequenceNumber::INITIAL.prev(), None);
        assert_eq!(SequenceNumber::new(5).prev(), Some(SequenceNumber::new(4)));
        assert_eq!(SequenceNumber::new(u64::MAX).next(), SequenceNumber::new(u64::MAX));
        assert_eq!(SequenceNumber::new(u64::MAX).checked_add(1), None);
    }

    #[test]
    fn distance_is_directional() {
        let a = SequenceNumber::new(10);
        let b = SequenceNumber::new(14);
        assert_eq!(b.distance_from(a), Some(4));
        assert_eq!(a.distance_from(b), None);
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&SequenceNumber::new(42)).expect("serialize");
        assert_eq!(json, "42");
        let handle: BufferHandle = serde_json::from_str("7").expect("deserialize");
        assert_eq!(handle.get(), 7);
        assert_eq!(handle.to_string(), "#7");
    }
}
