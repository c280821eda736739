//! Spanning-tuple tracking for concurrent raw-buffer formatting.
//!
//! Raw buffers of one partition are formatted by many threads at once and
//! arrive in any order. Tuples crossing a buffer boundary can only be
//! assembled once all buffers holding their fragments are known.
//! [`SequenceShredder`] records every buffer and hands each spanning record
//! to exactly one caller.
//!
//! ```
//! use spanweave_shredder::SequenceShredder;
//! use spanweave_types::{BufferHandle, SequenceNumber, StagedBuffer};
//!
//! let shredder = SequenceShredder::new(1);
//! // "AA\nB" followed by "B\nCC\n"
//! let first = StagedBuffer::with_delimiters(SequenceNumber::new(0), BufferHandle::new(10), 4, 2, 2);
//! let second = StagedBuffer::with_delimiters(SequenceNumber::new(1), BufferHandle::new(11), 5, 1, 4);
//!
//! shredder.resolve_leading(second).unwrap();
//! shredder.resolve_leading(first).unwrap();
//! let record = shredder.resolve_trailing(SequenceNumber::new(0)).unwrap();
//! assert_eq!(record.spanning_buffers.sequence_numbers(), vec![0, 1]);
//! ```

pub mod config;
pub mod metrics;
mod ring;
mod slot;
mod tracker;
pub mod validate;

pub use config::{LeakPolicy, ShredderConfig};
pub use metrics::ShredderMetricsSnapshot;
pub use tracker::SequenceShredder;
pub use validate::{UnresolvedReason, UnresolvedSlot, ValidationReport};
