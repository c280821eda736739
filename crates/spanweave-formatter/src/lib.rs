//! Record formatting for raw buffers that arrive out of order.
//!
//! A [`BufferPool`] owns the raw bytes of one partition. For every pooled
//! buffer a worker calls [`RecordFormatterTask::process`], which indexes the
//! tuple delimiters, registers the buffer with the spanning-tuple tracker and
//! returns the records this call is responsible for. When the partition's
//! last buffer is known, [`RecordFormatterTask::stop`] flushes the final
//! record and checks that nothing was lost.
//!
//! ```
//! use std::sync::Arc;
//!
//! use spanweave_formatter::{BufferPool, FormatterConfig, RecordFormatterTask};
//! use spanweave_types::SequenceNumber;
//!
//! let pool = Arc::new(BufferPool::new());
//! let task = RecordFormatterTask::new(FormatterConfig::default(), Arc::clone(&pool)).unwrap();
//! let second = pool.insert(SequenceNumber::new(1), b"lo\nworld".to_vec());
//! let first = pool.insert(SequenceNumber::new(0), b"hel".to_vec());
//!
//! let mut records = task.process(second).unwrap().into_records();
//! records.extend(task.process(first).unwrap().into_records());
//! records.extend(task.stop(SequenceNumber::new(1)).unwrap());
//!
//! let texts: Vec<&[u8]> = records.iter().map(|r| r.bytes.as_slice()).collect();
//! assert_eq!(texts, [&b"hello"[..], &b"world"[..]]);
//! ```

pub mod assembler;
pub mod config;
pub mod indexer;
pub mod metrics;
pub mod pool;
pub mod record;
pub mod task;

pub use assembler::{RecordEnd, SpanningRecordAssembler};
pub use config::FormatterConfig;
pub use indexer::{DelimiterIndexer, InBufferRecords};
pub use metrics::FormatterMetricsSnapshot;
pub use pool::{BufferPool, Fragments, PooledBuffer};
pub use record::{FormattedRecord, RecordDigest, RecordOrigin};
pub use task::{RecordFormatterTask, TaskOutcome};
