use serde::Serialize;
use smallvec::SmallVec;

use crate::sequence::SequenceNumber;
use crate::staged::StagedBuffer;

/// Ordered buffers that jointly hold one record split across buffer
/// boundaries.
///
/// Empty means nothing was resolved for the caller. A single element means
/// no spanning partner was needed or found. Two or more elements are a
/// spanning record the receiving caller now exclusively owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpanningBuffers {
    buffers: SmallVec<[StagedBuffer; 2]>,
}

impl SpanningBuffers {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(buffer: StagedBuffer) -> Self {
        let mut buffers = SmallVec::new();
        buffers.push(buffer);
        Self { buffers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// True when the buffers form a record spanning at least two buffers.
    #[must_use]
    pub fn is_spanning(&self) -> bool {
        self.buffers.len() >= 2
    }

    #[must_use]
    pub fn first(&self) -> Option<&StagedBuffer> {
        self.buffers.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&StagedBuffer> {
        self.buffers.last()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[StagedBuffer] {
        &self.buffers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StagedBuffer> {
        self.buffers.iter()
    }

    /// Index of the buffer with `sequence`, if present.
    #[must_use]
    pub fn position_of(&self, sequence: SequenceNumber) -> Option<usize> {
        self.buffers.iter().position(|b| b.sequence() == sequence)
    }

    /// Sequence numbers in order, for logs and assertions.
    #[must_use]
    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.buffers.iter().map(|b| b.sequence().get()).collect()
    }

    pub fn push(&mut self, buffer: StagedBuffer) {
        debug_assert!(
            self.buffers
                .last()
                .is_none_or(|prev| prev.sequence() < buffer.sequence()),
            "spanning buffers must be in ascending sequence order"
        );
        self.buffers.push(buffer);
    }
}

impl FromIterator<StagedBuffer> for SpanningBuffers {
    fn from_iter<I: IntoIterator<Item = StagedBuffer>>(iter: I) -> Self {
        let mut out = Self::empty();
        for buffer in iter {
            out.push(buffer);
        }
        out
    }
}

impl<'a> IntoIterator for &'a SpanningBuffers {
    type Item = &'a StagedBuffer;
    type IntoIter = std::slice::Iter<'a, StagedBuffer>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffers.iter()
    }
}

/// Outcome of a resolution attempt.
///
/// `is_in_range == false` means the sequence number currently falls outside
/// the window the tracker can resolve; the caller retries later. It is not an
/// error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SequenceShredderResult {
    pub is_in_range: bool,
    pub spanning_buffers: SpanningBuffers,
}

impl SequenceShredderResult {
    #[must_use]
    pub fn in_range(spanning_buffers: SpanningBuffers) -> Self {
        Self {
            is_in_range: true,
            spanning_buffers,
        }
    }

    /// In range, but nothing to hand out (yet).
    #[must_use]
    pub fn unresolved() -> Self {
        Self::in_range(SpanningBuffers::empty())
    }

    #[must_use]
    pub fn out_of_range() -> Self {
        Self {
            is_in_range: false,
            spanning_buffers: SpanningBuffers::empty(),
        }
    }

    /// True when this caller now owns a spanning record.
    #[must_use]
    pub fn owns_spanning_record(&self) -> bool {
        self.is_in_range && self.spanning_buffers.is_spanning()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::BufferHandle;

    fn buffer(raw: u64) -> StagedBuffer {
        StagedBuffer::without_delimiter(SequenceNumber::new(raw), BufferHandle::new(raw), 8)
    }

    #[test]
    fn spanning_needs_two_buffers() {
        assert!(!SpanningBuffers::empty().is_spanning());
        assert!(!SpanningBuffers::single(buffer(0)).is_spanning());
        let pair: SpanningBuffers = [buffer(0), buffer(1)].into_iter().collect();
        assert!(pair.is_spanning());
        assert_eq!(pair.sequence_numbers(), vec![0, 1]);
        assert_eq!(pair.position_of(SequenceNumber::new(1)), Some(1));
    }

    #[test]
    fn result_constructors() {
        assert!(!SequenceShredderResult::out_of_range().is_in_range);
        let unresolved = SequenceShredderResult::unresolved();
        assert!(unresolved.is_in_range);
        assert!(!unresolved.owns_spanning_record());
    }

    #[test]
    fn result_serializes_for_diagnostics() {
        let result = SequenceShredderResult::in_range([buffer(3), buffer(4)].into_iter().collect());
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["is_in_range"], true);
        assert_eq!(json["spanning_buffers"]["buffers"][1]["sequence"], 4);
    }
}
