//! Concatenation of spanning record fragments.

use std::ops::Range;
use std::sync::Arc;

use spanweave_error::{Result, SpanweaveError};
use spanweave_types::{SpanningBuffers, StagedBuffer};

use crate::pool::{BufferPool, Fragments};

/// What terminates the last buffer's contribution to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEnd {
    /// The first delimiter of the last buffer.
    Delimiter,
    /// The end of the stream; the last buffer contributes its trailing bytes.
    StreamEnd,
}

/// Builds owned records from the buffers the tracker hands out.
///
/// The first buffer contributes the bytes after its last delimiter (all of
/// them if it has none), interior buffers contribute everything, and the
/// last buffer contributes the bytes before its first delimiter.
#[derive(Debug, Clone)]
pub struct SpanningRecordAssembler {
    pool: Arc<BufferPool>,
    delimiter_size_in_bytes: u32,
}

impl SpanningRecordAssembler {
    #[must_use]
    pub fn new(pool: Arc<BufferPool>, delimiter_size_in_bytes: u32) -> Self {
        Self {
            pool,
            delimiter_size_in_bytes,
        }
    }

    /// Record bytes of `buffers`; empty when every fragment is empty.
    pub fn assemble(&self, buffers: &SpanningBuffers, end: RecordEnd) -> Result<Vec<u8>> {
        let ranges = self.fragment_ranges(buffers, end)?;
        let total = ranges.iter().map(|(_, range)| range.len()).sum();
        let mut record = Vec::with_capacity(total);
        for (staged, range) in ranges {
            let pooled = self.pool.get(staged.handle())?;
            if pooled.bytes.len() != staged.size_in_bytes() as usize {
                return Err(SpanweaveError::internal(format!(
                    "buffer {} holds {} bytes, descriptor says {}",
                    staged.sequence(),
                    pooled.bytes.len(),
                    staged.size_in_bytes()
                )));
            }
            record.extend_from_slice(&pooled.bytes[range]);
        }
        Ok(record)
    }

    /// Mark the fragments a record over `buffers` consumed.
    pub fn retire(&self, buffers: &SpanningBuffers, end: RecordEnd) -> Result<()> {
        let slice = buffers.as_slice();
        for (index, staged) in slice.iter().enumerate() {
            let fragments = if index == 0 {
                Fragments::TRAILING
            } else if index + 1 == slice.len() && end == RecordEnd::Delimiter {
                Fragments::LEADING
            } else {
                Fragments::all()
            };
            self.pool.retire(staged.handle(), fragments)?;
        }
        Ok(())
    }

    fn fragment_ranges(
        &self,
        buffers: &SpanningBuffers,
        end: RecordEnd,
    ) -> Result<Vec<(StagedBuffer, Range<usize>)>> {
        let slice = buffers.as_slice();
        if end == RecordEnd::Delimiter && slice.len() == 1 {
            return Err(SpanweaveError::internal(format!(
                "delimited record needs two buffers, got only {}",
                slice[0].sequence()
            )));
        }
        slice
            .iter()
            .enumerate()
            .map(|(index, staged)| {
                let is_last = index + 1 == slice.len();
                let range = if index == 0 {
                    staged
                        .trailing_range(self.delimiter_size_in_bytes)
                        .ok_or_else(|| {
                            SpanweaveError::internal(format!(
                                "record starts in {} before its last delimiter is known",
                                staged.sequence()
                            ))
                        })?
                } else if is_last && end == RecordEnd::Delimiter {
                    if !staged.has_delimiter() {
                        return Err(SpanweaveError::DelimiterMissing {
                            sequence: staged.sequence().get(),
                        });
                    }
                    staged.leading_range()
                } else if staged.has_delimiter() {
                    return Err(SpanweaveError::internal(format!(
                        "buffer {} with delimiter inside a spanning record",
                        staged.sequence()
                    )));
                } else {
                    0..staged.size_in_bytes() as usize
                };
                Ok((*staged, range))
            })
            .collect()
    }
}
