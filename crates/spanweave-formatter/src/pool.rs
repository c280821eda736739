//! Owner of raw buffer bytes.
//!
//! The tracker only sees [`BufferHandle`]s. A pooled buffer stays alive
//! until both of its fragments were consumed by an emitted record, which is
//! exactly when the tracker slot describing it reaches its terminal state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use parking_lot::Mutex;
use spanweave_error::{Result, SpanweaveError};
use spanweave_types::{BufferHandle, SequenceNumber};
use tracing::trace;

bitflags! {
    /// Fragments of a buffer that records have consumed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Fragments: u8 {
        /// Bytes before the first delimiter.
        const LEADING = 1 << 0;
        /// Bytes after the last delimiter.
        const TRAILING = 1 << 1;
    }
}

/// A raw buffer checked out of the pool.
#[derive(Debug, Clone)]
pub struct PooledBuffer {
    pub sequence: SequenceNumber,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug)]
struct Entry {
    buffer: PooledBuffer,
    consumed: Fragments,
}

/// Raw buffers of one partition, keyed by handle.
#[derive(Debug)]
pub struct BufferPool {
    entries: Mutex<HashMap<BufferHandle, Entry>>,
    next_handle: AtomicU64,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Take ownership of the bytes of buffer `sequence`.
    pub fn insert(&self, sequence: SequenceNumber, bytes: impl Into<Arc<[u8]>>) -> BufferHandle {
        let handle = BufferHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let buffer = PooledBuffer {
            sequence,
            bytes: bytes.into(),
        };
        self.entries.lock().insert(
            handle,
            Entry {
                buffer,
                consumed: Fragments::empty(),
            },
        );
        handle
    }

    pub fn get(&self, handle: BufferHandle) -> Result<PooledBuffer> {
        self.entries
            .lock()
            .get(&handle)
            .map(|entry| entry.buffer.clone())
            .ok_or(SpanweaveError::UnknownBuffer {
                handle: handle.get(),
            })
    }

    /// Mark `fragments` of `handle` as consumed. The buffer is released once
    /// both fragments are; returns whether that happened now.
    pub fn retire(&self, handle: BufferHandle, fragments: Fragments) -> Result<bool> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&handle).ok_or(SpanweaveError::UnknownBuffer {
            handle: handle.get(),
        })?;
        entry.consumed |= fragments;
        if !entry.consumed.is_all() {
            return Ok(false);
        }
        if let Some(entry) = entries.remove(&handle) {
            trace!(
                handle = %handle,
                sequence = %entry.buffer.sequence,
                "raw buffer released"
            );
        }
        Ok(true)
    }

    /// Buffers still held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Sequence numbers of the buffers still held, ascending.
    #[must_use]
    pub fn held_sequences(&self) -> Vec<SequenceNumber> {
        let mut held: Vec<SequenceNumber> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.buffer.sequence)
            .collect();
        held.sort_unstable();
        held
    }
}
