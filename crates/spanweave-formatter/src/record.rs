//! Formatted output records.

use serde::Serialize;
use spanweave_types::SequenceNumber;
use xxhash_rust::xxh3::xxh3_64;

/// Where a record's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Before the first delimiter of the partition's first buffer.
    StreamStart,
    /// Between two delimiters of one buffer.
    InBuffer,
    /// Assembled from fragments of two or more buffers.
    Spanning,
    /// After the last delimiter of the stream, terminated by its end.
    StreamEnd,
}

/// One record, as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FormattedRecord {
    /// Buffer whose processing produced the record.
    pub sequence: SequenceNumber,
    pub origin: RecordOrigin,
    pub bytes: Vec<u8>,
}

impl FormattedRecord {
    #[must_use]
    pub fn new(sequence: SequenceNumber, origin: RecordOrigin, bytes: Vec<u8>) -> Self {
        Self {
            sequence,
            origin,
            bytes,
        }
    }
}

/// Order-independent fingerprint of a multiset of records.
///
/// Sum of the xxh3 hashes of the record bytes plus a count, so two sides
/// of a pipeline can compare their output regardless of emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct RecordDigest {
    pub records: u64,
    pub hash_sum: u64,
}

impl RecordDigest {
    /// Digest of every record in `records`.
    pub fn of<I, B>(records: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut digest = Self::default();
        for record in records {
            digest.absorb(record.as_ref());
        }
        digest
    }

    pub fn absorb(&mut self, bytes: &[u8]) {
        self.records += 1;
        self.hash_sum = self.hash_sum.wrapping_add(xxh3_64(bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_ignores_order() {
        let forward = RecordDigest::of(["alpha", "beta", "gamma"]);
        let backward = RecordDigest::of(["gamma", "beta", "alpha"]);
        assert_eq!(forward, backward);
        assert_eq!(forward.records, 3);
    }

    #[test]
    fn digest_sees_content_and_multiplicity() {
        let once = RecordDigest::of([b"a"]);
        let twice = RecordDigest::of([b"a", b"a"]);
        assert_ne!(once, twice);
        assert_ne!(RecordDigest::of([b"a"]), RecordDigest::of([b"b"]));
    }

    #[test]
    fn record_serializes_origin_in_snake_case() {
        let record = FormattedRecord::new(SequenceNumber::new(4), RecordOrigin::StreamEnd, b"x".to_vec());
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["origin"], "stream_end");
        assert_eq!(json["sequence"], 4);
    }
}
