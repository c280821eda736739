//! Tuple delimiter search inside one raw buffer.
//!
//! Matches are non-overlapping and found left to right, so a delimiter like
//! `"||"` splits `"a|||b"` into `"a"` and `"|b"`.

use memchr::memmem;
use spanweave_error::{Result, SpanweaveError};
use spanweave_types::DelimiterLayout;

/// Finds tuple delimiters with a precompiled `memmem` searcher.
#[derive(Debug, Clone)]
pub struct DelimiterIndexer {
    finder: memmem::Finder<'static>,
}

impl DelimiterIndexer {
    pub fn new(delimiter: &[u8]) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(SpanweaveError::config("tuple delimiter must not be empty"));
        }
        Ok(Self {
            finder: memmem::Finder::new(delimiter).into_owned(),
        })
    }

    #[must_use]
    pub fn delimiter(&self) -> &[u8] {
        self.finder.needle()
    }

    /// Size of the delimiter in bytes.
    #[must_use]
    pub fn delimiter_len(&self) -> usize {
        self.finder.needle().len()
    }

    /// Offset of the first delimiter, if any.
    #[must_use]
    pub fn first(&self, bytes: &[u8]) -> Option<usize> {
        self.finder.find(bytes)
    }

    /// Offsets of the first and last delimiter as a layout.
    ///
    /// Offsets are `u32`; callers reject larger buffers before indexing.
    #[must_use]
    pub fn layout(&self, bytes: &[u8]) -> DelimiterLayout {
        let mut matches = self.finder.find_iter(bytes);
        let Some(first) = matches.next() else {
            return DelimiterLayout::Absent;
        };
        let last = matches.last().unwrap_or(first);
        DelimiterLayout::Complete {
            first: first as u32,
            last: last as u32,
        }
    }

    /// Complete records between the first and last delimiter of `bytes`.
    ///
    /// The fragments before the first and after the last delimiter belong
    /// to spanning records and are not yielded. Empty records are.
    pub fn records<'a>(&'a self, bytes: &'a [u8]) -> InBufferRecords<'a> {
        InBufferRecords {
            bytes,
            matches: self.finder.find_iter(bytes),
            previous_end: None,
            delimiter_len: self.delimiter_len(),
        }
    }
}

/// Iterator over the records fully contained in one buffer.
#[derive(Debug)]
pub struct InBufferRecords<'a> {
    bytes: &'a [u8],
    matches: memmem::FindIter<'a, 'a>,
    previous_end: Option<usize>,
    delimiter_len: usize,
}

impl<'a> Iterator for InBufferRecords<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let position = self.matches.next()?;
            let start = self.previous_end.replace(position + self.delimiter_len);
            if let Some(start) = start {
                return Some(&self.bytes[start..position]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn newline() -> DelimiterIndexer {
        DelimiterIndexer::new(b"\n").expect("valid delimiter")
    }

    #[test]
    fn layout_of_buffer_without_delimiter() {
        assert_eq!(newline().layout(b"abcdef"), DelimiterLayout::Absent);
        assert_eq!(newline().layout(b""), DelimiterLayout::Absent);
    }

    #[test]
    fn layout_with_single_and_multiple_delimiters() {
        let indexer = newline();
        assert_eq!(
            indexer.layout(b"ab\ncd"),
            DelimiterLayout::Complete { first: 2, last: 2 }
        );
        assert_eq!(
            indexer.layout(b"B\nCCC\n"),
            DelimiterLayout::Complete { first: 1, last: 5 }
        );
        assert_eq!(indexer.first(b"xx\nyy\n"), Some(2));
    }

    #[test]
    fn records_between_first_and_last_delimiter() {
        let indexer = newline();
        let records: Vec<&[u8]> = indexer.records(b"tail\none\n\ntwo\nhead").collect();
        assert_eq!(records, vec![&b"one"[..], &b""[..], &b"two"[..]]);
        assert_eq!(indexer.records(b"a\nb").count(), 0);
        assert_eq!(indexer.records(b"plain").count(), 0);
    }

    #[test]
    fn multi_byte_delimiter_matches_do_not_overlap() {
        let indexer = DelimiterIndexer::new(b"||").expect("valid");
        assert_eq!(indexer.delimiter_len(), 2);
        // Matches at 1 and 5; the third '|' belongs to the next record.
        assert_eq!(
            indexer.layout(b"a|||b||c"),
            DelimiterLayout::Complete { first: 1, last: 5 }
        );
        let records: Vec<&[u8]> = indexer.records(b"a|||b||c").collect();
        assert_eq!(records, vec![&b"|b"[..]]);
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        let err = DelimiterIndexer::new(b"").expect_err("empty");
        assert_eq!(err.exit_code(), 22);
    }
}
