use std::ops::Range;

use serde::{Deserialize, Serialize};
use spanweave_error::{Result, SpanweaveError};

use crate::sequence::{BufferHandle, SequenceNumber};

/// Where the tuple delimiters of a raw buffer are, as far as the indexer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelimiterLayout {
    /// No complete delimiter: the whole buffer is an interior part of a
    /// larger spanning record.
    Absent,
    /// The first delimiter is known; the last one will be supplied later.
    Partial { first: u32 },
    /// Offsets of the first and last delimiter (equal if there is one).
    Complete { first: u32, last: u32 },
}

impl DelimiterLayout {
    #[must_use]
    pub const fn has_delimiter(self) -> bool {
        !matches!(self, Self::Absent)
    }

    #[must_use]
    pub const fn first(self) -> Option<u32> {
        match self {
            Self::Absent => None,
            Self::Partial { first } | Self::Complete { first, .. } => Some(first),
        }
    }

    #[must_use]
    pub const fn last(self) -> Option<u32> {
        match self {
            Self::Complete { last, .. } => Some(last),
            Self::Absent | Self::Partial { .. } => None,
        }
    }
}

/// Descriptor of one raw buffer handed to the tracker.
///
/// The bytes live in a pool; `handle` addresses them. The descriptor is
/// `Copy` and may be duplicated freely, ownership of the bytes never moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagedBuffer {
    sequence: SequenceNumber,
    handle: BufferHandle,
    size_in_bytes: u32,
    layout: DelimiterLayout,
}

impl StagedBuffer {
    #[must_use]
    pub const fn new(
        sequence: SequenceNumber,
        handle: BufferHandle,
        size_in_bytes: u32,
        layout: DelimiterLayout,
    ) -> Self {
        Self {
            sequence,
            handle,
            size_in_bytes,
            layout,
        }
    }

    /// Buffer containing at least one delimiter at known offsets.
    #[must_use]
    pub const fn with_delimiters(
        sequence: SequenceNumber,
        handle: BufferHandle,
        size_in_bytes: u32,
        first: u32,
        last: u32,
    ) -> Self {
        Self::new(
            sequence,
            handle,
            size_in_bytes,
            DelimiterLayout::Complete { first, last },
        )
    }

    /// Buffer without any delimiter.
    #[must_use]
    pub const fn without_delimiter(
        sequence: SequenceNumber,
        handle: BufferHandle,
        size_in_bytes: u32,
    ) -> Self {
        Self::new(sequence, handle, size_in_bytes, DelimiterLayout::Absent)
    }

    #[must_use]
    pub const fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    #[must_use]
    pub const fn handle(&self) -> BufferHandle {
        self.handle
    }

    #[must_use]
    pub const fn size_in_bytes(&self) -> u32 {
        self.size_in_bytes
    }

    #[must_use]
    pub const fn layout(&self) -> DelimiterLayout {
        self.layout
    }

    #[must_use]
    pub const fn has_delimiter(&self) -> bool {
        self.layout.has_delimiter()
    }

    #[must_use]
    pub const fn offset_of_first_delimiter(&self) -> Option<u32> {
        self.layout.first()
    }

    #[must_use]
    pub const fn offset_of_last_delimiter(&self) -> Option<u32> {
        self.layout.last()
    }

    /// Copy of this descriptor with the last delimiter offset filled in.
    #[must_use]
    pub const fn with_last_delimiter(self, last: u32) -> Self {
        let layout = match self.layout {
            DelimiterLayout::Partial { first } | DelimiterLayout::Complete { first, .. } => {
                DelimiterLayout::Complete { first, last }
            }
            DelimiterLayout::Absent => DelimiterLayout::Absent,
        };
        Self { layout, ..self }
    }

    /// Byte range of the fragment before the first delimiter.
    ///
    /// A buffer without delimiter contributes all of its bytes.
    #[must_use]
    pub fn leading_range(&self) -> Range<usize> {
        let end = self.layout.first().unwrap_or(self.size_in_bytes);
        0..end as usize
    }

    /// Byte range of the fragment after the last delimiter.
    ///
    /// `None` while the last delimiter offset is still unknown. A buffer
    /// without delimiter contributes all of its bytes.
    #[must_use]
    pub fn trailing_range(&self, delimiter_size_in_bytes: u32) -> Option<Range<usize>> {
        match self.layout {
            DelimiterLayout::Absent => Some(0..self.size_in_bytes as usize),
            DelimiterLayout::Partial { .. } => None,
            DelimiterLayout::Complete { last, .. } => {
                let start = last.saturating_add(delimiter_size_in_bytes);
                Some(start.min(self.size_in_bytes) as usize..self.size_in_bytes as usize)
            }
        }
    }

    /// Check that the delimiter offsets fit inside the buffer.
    pub fn validate(&self, delimiter_size_in_bytes: u32) -> Result<()> {
        let fits = |offset: u32| {
            offset
                .checked_add(delimiter_size_in_bytes)
                .is_some_and(|end| end <= self.size_in_bytes)
        };
        let detail = match self.layout {
            DelimiterLayout::Absent => None,
            DelimiterLayout::Partial { first } => {
                (!fits(first)).then(|| format!("first delimiter at {first} exceeds size"))
            }
            DelimiterLayout::Complete { first, last } => {
                if first > last {
                    Some(format!("first delimiter {first} after last delimiter {last}"))
                } else if !fits(last) {
                    Some(format!("last delimiter at {last} exceeds size"))
                } else {
                    None
                }
            }
        };
        match detail {
            None => Ok(()),
            Some(detail) => Err(SpanweaveError::InvalidDelimiterLayout {
                sequence: self.sequence.get(),
                detail: format!("{detail} {}", self.size_in_bytes),
            }),
        }
    }
}
