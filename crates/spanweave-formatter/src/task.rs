//! Per-partition formatting task.
//!
//! Worker threads call [`RecordFormatterTask::process`] for raw buffers in
//! whatever order they arrive. Records fully inside a buffer are emitted
//! directly; records crossing buffer boundaries are emitted by whichever
//! call completes them, as decided by the tracker.

use std::sync::Arc;

use spanweave_error::{Result, SpanweaveError};
use spanweave_shredder::{SequenceShredder, ShredderMetricsSnapshot};
use spanweave_types::{
    BufferHandle, DelimiterLayout, SequenceNumber, SequenceShredderResult, SpanningBuffers,
    StagedBuffer,
};
use tracing::{debug, info, trace};

use crate::assembler::{RecordEnd, SpanningRecordAssembler};
use crate::config::FormatterConfig;
use crate::indexer::DelimiterIndexer;
use crate::metrics::{FormatterMetrics, FormatterMetricsSnapshot};
use crate::pool::{BufferPool, Fragments};
use crate::record::{FormattedRecord, RecordOrigin};

/// Result of processing one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The buffer was formatted; these records are now owned by the caller.
    Done(Vec<FormattedRecord>),
    /// The buffer is outside the tracker's window. Nothing was registered;
    /// process it again later.
    Repeat,
}

impl TaskOutcome {
    #[must_use]
    pub fn is_repeat(&self) -> bool {
        matches!(self, Self::Repeat)
    }

    /// Records of a finished buffer; empty for `Repeat`.
    #[must_use]
    pub fn into_records(self) -> Vec<FormattedRecord> {
        match self {
            Self::Done(records) => records,
            Self::Repeat => Vec::new(),
        }
    }
}

/// Formats the raw buffers of one partition.
#[derive(Debug)]
pub struct RecordFormatterTask {
    config: FormatterConfig,
    shredder: SequenceShredder,
    pool: Arc<BufferPool>,
    indexer: DelimiterIndexer,
    assembler: SpanningRecordAssembler,
    metrics: FormatterMetrics,
}

impl RecordFormatterTask {
    pub fn new(config: FormatterConfig, pool: Arc<BufferPool>) -> Result<Self> {
        config.validate()?;
        let shredder_config = config.shredder_config()?;
        let delimiter_size_in_bytes = shredder_config.delimiter_size_in_bytes;
        let shredder = SequenceShredder::with_config(shredder_config)?;
        let indexer = DelimiterIndexer::new(config.tuple_delimiter.as_bytes())?;
        let assembler = SpanningRecordAssembler::new(Arc::clone(&pool), delimiter_size_in_bytes);
        Ok(Self {
            config,
            shredder,
            pool,
            indexer,
            assembler,
            metrics: FormatterMetrics::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    #[must_use]
    pub fn shredder(&self) -> &SequenceShredder {
        &self.shredder
    }

    #[must_use]
    pub fn metrics(&self) -> FormatterMetricsSnapshot {
        self.metrics.snapshot()
    }

    #[must_use]
    pub fn shredder_metrics(&self) -> ShredderMetricsSnapshot {
        self.shredder.metrics()
    }

    /// Format the pooled buffer `handle`.
    ///
    /// Emits, in order: the spanning record that ends in this buffer (or
    /// the head of the stream for the first buffer), the records between
    /// its first and last delimiter, and the spanning record that starts
    /// in it. Either spanning record may instead go to the call that
    /// completes it later.
    ///
    /// A buffer whose sequence number the tracker already recycled fails
    /// with `DuplicateRegistration` instead of repeating.
    pub fn process(&self, handle: BufferHandle) -> Result<TaskOutcome> {
        let pooled = self.pool.get(handle)?;
        let sequence = pooled.sequence;
        // Below the tail the tracker rejects the registration itself.
        if !self.shredder.is_in_range(sequence) && sequence >= self.shredder.tail() {
            return Ok(self.repeat(sequence));
        }

        let bytes = &pooled.bytes[..];
        let size_in_bytes =
            u32::try_from(bytes.len()).map_err(|_| SpanweaveError::InvalidDelimiterLayout {
                sequence: sequence.get(),
                detail: format!("{} bytes exceed the u32 offset range", bytes.len()),
            })?;
        let layout = self.indexer.layout(bytes);
        let registered = match layout {
            DelimiterLayout::Complete { first, .. } if self.config.defer_last_delimiter => {
                DelimiterLayout::Partial { first }
            }
            layout => layout,
        };
        let staged = StagedBuffer::new(sequence, handle, size_in_bytes, registered);

        let leading = self.shredder.resolve_leading(staged)?;
        if !leading.is_in_range {
            return Ok(self.repeat(sequence));
        }
        self.metrics.record_buffer();
        trace!(
            sequence = %sequence,
            size = size_in_bytes,
            has_delimiter = layout.has_delimiter(),
            "raw buffer registered"
        );

        let mut records = Vec::new();
        self.emit_leading(&staged, layout, bytes, &leading.spanning_buffers, &mut records)?;
        for record in self.indexer.records(bytes) {
            self.emit(&mut records, sequence, RecordOrigin::InBuffer, record.to_vec());
        }

        let trailing = match layout.last() {
            Some(last) if self.config.defer_last_delimiter => {
                self.shredder.resolve_trailing_with_offset(sequence, last)?
            }
            _ => self.shredder.resolve_trailing(sequence)?,
        };
        self.emit_trailing(sequence, &trailing, &mut records)?;
        Ok(TaskOutcome::Done(records))
    }

    /// Flush the record the end of the stream terminates, then check that
    /// every spanning record was handed out.
    ///
    /// `last` is the sequence number of the partition's final buffer, which
    /// must have been processed.
    pub fn stop(&self, last: SequenceNumber) -> Result<Vec<FormattedRecord>> {
        let buffers = self.shredder.finish_stream(last)?;
        let mut records = Vec::new();
        if !buffers.is_empty() {
            let bytes = self.assembler.assemble(&buffers, RecordEnd::StreamEnd)?;
            self.assembler.retire(&buffers, RecordEnd::StreamEnd)?;
            self.emit(&mut records, last, RecordOrigin::StreamEnd, bytes);
        }
        self.shredder.validate_state().into_result()?;
        let metrics = self.metrics.snapshot();
        info!(
            last = %last,
            records = metrics.records,
            spanning_records = metrics.spanning_records,
            repeats = metrics.repeats,
            held_buffers = self.pool.len(),
            "formatter stopped"
        );
        Ok(records)
    }

    fn repeat(&self, sequence: SequenceNumber) -> TaskOutcome {
        self.metrics.record_repeat();
        debug!(sequence = %sequence, "buffer out of range, repeating");
        TaskOutcome::Repeat
    }

    fn emit_leading(
        &self,
        staged: &StagedBuffer,
        layout: DelimiterLayout,
        bytes: &[u8],
        buffers: &SpanningBuffers,
        records: &mut Vec<FormattedRecord>,
    ) -> Result<()> {
        let sequence = staged.sequence();
        if buffers.is_spanning() {
            return self.emit_spanning(sequence, buffers, records);
        }
        let starts_stream = buffers.first().is_some_and(|b| b.sequence() == sequence);
        if !starts_stream {
            return Ok(());
        }
        // Without a delimiter the whole first buffer is trailing fragment.
        self.pool.retire(staged.handle(), Fragments::LEADING)?;
        if let Some(first) = layout.first() {
            let head = bytes[..first as usize].to_vec();
            self.emit(records, sequence, RecordOrigin::StreamStart, head);
        }
        Ok(())
    }

    fn emit_trailing(
        &self,
        sequence: SequenceNumber,
        trailing: &SequenceShredderResult,
        records: &mut Vec<FormattedRecord>,
    ) -> Result<()> {
        if !trailing.is_in_range {
            // The closing buffer is beyond the window; its own leading
            // request will complete the record.
            trace!(sequence = %sequence, "trailing record left to closing buffer");
            return Ok(());
        }
        if trailing.owns_spanning_record() {
            self.emit_spanning(sequence, &trailing.spanning_buffers, records)?;
        }
        Ok(())
    }

    fn emit_spanning(
        &self,
        sequence: SequenceNumber,
        buffers: &SpanningBuffers,
        records: &mut Vec<FormattedRecord>,
    ) -> Result<()> {
        let bytes = self.assembler.assemble(buffers, RecordEnd::Delimiter)?;
        self.assembler.retire(buffers, RecordEnd::Delimiter)?;
        trace!(
            sequence = %sequence,
            buffers = ?buffers.sequence_numbers(),
            size = bytes.len(),
            "spanning record assembled"
        );
        self.emit(records, sequence, RecordOrigin::Spanning, bytes);
        Ok(())
    }

    fn emit(
        &self,
        records: &mut Vec<FormattedRecord>,
        sequence: SequenceNumber,
        origin: RecordOrigin,
        bytes: Vec<u8>,
    ) {
        if bytes.is_empty() {
            self.metrics.record_empty_dropped();
            return;
        }
        let record = FormattedRecord::new(sequence, origin, bytes);
        self.metrics.record_emitted(&record);
        records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> RecordFormatterTask {
        RecordFormatterTask::new(FormatterConfig::default(), Arc::new(BufferPool::new()))
            .expect("valid config")
    }

    fn insert(task: &RecordFormatterTask, raw: u64, bytes: &[u8]) -> BufferHandle {
        task.pool().insert(SequenceNumber::new(raw), bytes.to_vec())
    }

    fn texts(records: &[FormattedRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| String::from_utf8_lossy(&r.bytes).into_owned())
            .collect()
    }

    #[test]
    fn in_order_buffers_emit_records_in_order() {
        let task = task();
        let a = insert(&task, 0, b"one\ntw");
        let b = insert(&task, 1, b"o\nthree\nfo");
        let c = insert(&task, 2, b"ur");

        let mut out = Vec::new();
        for handle in [a, b, c] {
            out.extend(task.process(handle).expect("process").into_records());
        }
        out.extend(task.stop(SequenceNumber::new(2)).expect("stop"));

        assert_eq!(texts(&out), vec!["one", "two", "three", "four"]);
        assert_eq!(out[0].origin, RecordOrigin::StreamStart);
        assert_eq!(out[1].origin, RecordOrigin::Spanning);
        assert_eq!(out[2].origin, RecordOrigin::InBuffer);
        assert_eq!(out[3].origin, RecordOrigin::StreamEnd);
        assert!(task.pool().is_empty(), "{:?}", task.pool().held_sequences());
    }

    #[test]
    fn spanning_record_goes_to_the_buffer_completing_it() {
        let task = task();
        let a = insert(&task, 0, b"x\nAA");
        let b = insert(&task, 1, b"BB");
        let c = insert(&task, 2, b"CC\ny");

        let first = task.process(c).expect("c").into_records();
        assert!(first.is_empty());
        let second = task.process(a).expect("a").into_records();
        assert_eq!(texts(&second), vec!["x"]);
        let third = task.process(b).expect("b").into_records();
        assert_eq!(texts(&third), vec!["AABBCC"]);
        assert_eq!(third[0].sequence, SequenceNumber::new(1));

        let tail = task.stop(SequenceNumber::new(2)).expect("stop");
        assert_eq!(texts(&tail), vec!["y"]);
        assert!(task.pool().is_empty());
    }

    #[test]
    fn empty_records_are_dropped_and_counted() {
        let task = task();
        let a = insert(&task, 0, b"a\n\n");
        let b = insert(&task, 1, b"\nb\n");
        let mut out = task.process(a).expect("a").into_records();
        out.extend(task.process(b).expect("b").into_records());
        out.extend(task.stop(SequenceNumber::new(1)).expect("stop"));

        assert_eq!(texts(&out), vec!["a", "b"]);
        // "" between a's delimiters, the spanning "", and the stream end "".
        assert_eq!(task.metrics().empty_records_dropped, 3);
    }

    #[test]
    fn single_buffer_stream_without_delimiter() {
        let task = task();
        let a = insert(&task, 0, b"lonely");
        assert!(task.process(a).expect("a").into_records().is_empty());
        let tail = task.stop(SequenceNumber::new(0)).expect("stop");
        assert_eq!(texts(&tail), vec!["lonely"]);
        assert!(task.pool().is_empty());
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let task = task();
        let err = task.process(BufferHandle::new(99)).expect_err("unknown");
        assert_eq!(err, SpanweaveError::UnknownBuffer { handle: 99 });
    }

    #[test]
    fn reprocessing_a_buffer_is_an_error() {
        let task = task();
        let a = insert(&task, 0, b"a\nb");
        let c = insert(&task, 1, b"c\nd");
        task.process(a).expect("a");
        let out = task.process(c).expect("c").into_records();
        assert_eq!(texts(&out), vec!["bc"]);

        // Slot 0 is fully claimed and recycled once the tail moves past it.
        let again = insert(&task, 0, b"a\nb");
        let err = task.process(again).expect_err("recycled slot");
        assert_eq!(err, SpanweaveError::DuplicateRegistration { sequence: 0 });
        assert_eq!(task.shredder().tail(), SequenceNumber::new(1));

        // Slot 1 still waits for its trailing record.
        let again = insert(&task, 1, b"c\nd");
        let err = task.process(again).expect_err("live slot");
        assert_eq!(err, SpanweaveError::DuplicateRegistration { sequence: 1 });
        assert_eq!(task.metrics().repeats, 0);
    }

    #[test]
    fn stop_reports_records_left_behind() {
        let task = task();
        insert(&task, 0, b"a\nb");
        let c = insert(&task, 1, b"c\nd");
        task.process(c).expect("c");
        // Buffer 0 was never processed, so 1 cannot be the declared end.
        let err = task.stop(SequenceNumber::new(1)).expect_err("gap");
        assert!(matches!(err, SpanweaveError::UnresolvedSpanningRecords { .. }), "{err}");
    }
}
