//! Formatter counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

use crate::record::{FormattedRecord, RecordDigest, RecordOrigin};

#[derive(Debug, Default)]
pub(crate) struct FormatterMetrics {
    buffers_formatted: AtomicU64,
    repeats: AtomicU64,
    records: AtomicU64,
    spanning_records: AtomicU64,
    empty_records_dropped: AtomicU64,
    bytes: AtomicU64,
    hash_sum: AtomicU64,
}

/// Point-in-time copy of a formatter's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FormatterMetricsSnapshot {
    /// Buffers registered with the tracker and formatted.
    pub buffers_formatted: u64,
    /// Buffers sent back because they were out of range.
    pub repeats: u64,
    pub records: u64,
    /// Records assembled from two or more buffers, stream end included.
    pub spanning_records: u64,
    pub empty_records_dropped: u64,
    pub bytes: u64,
    /// Digest of every record emitted so far.
    pub digest: RecordDigest,
}

impl FormatterMetrics {
    pub(crate) fn record_buffer(&self) {
        self.buffers_formatted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_repeat(&self) {
        self.repeats.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_dropped(&self) {
        self.empty_records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_emitted(&self, record: &FormattedRecord) {
        self.records.fetch_add(1, Ordering::Relaxed);
        if matches!(record.origin, RecordOrigin::Spanning | RecordOrigin::StreamEnd) {
            self.spanning_records.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes
            .fetch_add(record.bytes.len() as u64, Ordering::Relaxed);
        self.hash_sum
            .fetch_add(xxh3_64(&record.bytes), Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FormatterMetricsSnapshot {
        let records = self.records.load(Ordering::Relaxed);
        FormatterMetricsSnapshot {
            buffers_formatted: self.buffers_formatted.load(Ordering::Relaxed),
            repeats: self.repeats.load(Ordering::Relaxed),
            records,
            spanning_records: self.spanning_records.load(Ordering::Relaxed),
            empty_records_dropped: self.empty_records_dropped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            digest: RecordDigest {
                records,
                hash_sum: self.hash_sum.load(Ordering::Relaxed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use spanweave_types::SequenceNumber;

    use super::*;

    #[test]
    fn digest_matches_records_emitted() {
        let metrics = FormatterMetrics::default();
        let records = [
            FormattedRecord::new(SequenceNumber::new(0), RecordOrigin::InBuffer, b"one".to_vec()),
            FormattedRecord::new(SequenceNumber::new(1), RecordOrigin::Spanning, b"two".to_vec()),
        ];
        for record in &records {
            metrics.record_emitted(record);
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records, 2);
        assert_eq!(snapshot.spanning_records, 1);
        assert_eq!(snapshot.bytes, 6);
        assert_eq!(snapshot.digest, RecordDigest::of(records.iter().map(|r| &r.bytes)));
    }
}
