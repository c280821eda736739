//! Stream model shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use spanweave_types::{BufferHandle, SequenceNumber, StagedBuffer};

pub fn seq(raw: u64) -> SequenceNumber {
    SequenceNumber::new(raw)
}

/// Buffer with delimiters at `first` and `last`.
pub fn delimited(raw: u64, size: u32, first: u32, last: u32) -> StagedBuffer {
    StagedBuffer::with_delimiters(seq(raw), BufferHandle::new(1000 + raw), size, first, last)
}

/// Buffer without any delimiter.
pub fn interior(raw: u64, size: u32) -> StagedBuffer {
    StagedBuffer::without_delimiter(seq(raw), BufferHandle::new(1000 + raw), size)
}

/// Build a stream of buffers from a delimiter pattern: `true` means the
/// buffer holds at least one delimiter.
pub fn stream_from_pattern(pattern: &[bool]) -> Vec<StagedBuffer> {
    pattern
        .iter()
        .enumerate()
        .map(|(i, &has_delimiter)| {
            let raw = i as u64;
            if has_delimiter {
                delimited(raw, 8, 2, 5)
            } else {
                interior(raw, 8)
            }
        })
        .collect()
}

/// Spanning records a correct tracker must hand out, as `start..=end`
/// sequence lists keyed by their closing buffer.
///
/// Every buffer with a delimiter except the first closes exactly one record,
/// which starts at the nearest earlier buffer with a delimiter or at the
/// first buffer.
pub fn expected_records(pattern: &[bool]) -> BTreeMap<u64, Vec<u64>> {
    let mut records = BTreeMap::new();
    let mut anchor = 0_u64;
    for (i, &has_delimiter) in pattern.iter().enumerate().skip(1) {
        let raw = i as u64;
        if has_delimiter {
            records.insert(raw, (anchor..=raw).collect());
            anchor = raw;
        }
    }
    records
}

/// Start of the record the stream end terminates.
pub fn final_anchor(pattern: &[bool]) -> u64 {
    pattern
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, has_delimiter)| **has_delimiter)
        .map(|(i, _)| i as u64)
        .next_back()
        .unwrap_or(0)
}

/// Collects handed-out spanning records and fails on any duplicate.
#[derive(Debug, Default)]
pub struct RecordLedger {
    records: BTreeMap<u64, Vec<u64>>,
}

impl RecordLedger {
    pub fn absorb(&mut self, sequences: Vec<u64>) {
        if sequences.len() < 2 {
            return;
        }
        let closing = *sequences.last().expect("non-empty");
        if let Some(previous) = self.records.insert(closing, sequences.clone()) {
            panic!("record closed by {closing} handed out twice: {previous:?} and {sequences:?}");
        }
    }

    pub fn into_records(self) -> BTreeMap<u64, Vec<u64>> {
        self.records
    }
}
