use thiserror::Error;

/// Primary error type for spanweave operations.
///
/// Only caller misuse, configuration problems and broken invariants are
/// errors. An out-of-range sequence number or a spanning record that cannot
/// be resolved yet is a normal outcome and is reported as a value, never
/// through this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpanweaveError {
    // === Caller Misuse ===
    /// A buffer was registered twice for the same sequence number.
    #[error("sequence number {sequence} was already registered")]
    DuplicateRegistration { sequence: u64 },

    /// A lazily supplied trailing offset disagrees with the one already set.
    #[error(
        "conflicting trailing offset for sequence number {sequence}: already {existing}, requested {requested}"
    )]
    ConflictingTrailingOffset {
        sequence: u64,
        existing: u32,
        requested: u32,
    },

    /// A trailing resolution was requested before the buffer was registered.
    #[error("sequence number {sequence} has not been registered")]
    NotRegistered { sequence: u64 },

    /// The delimiter metadata of a buffer does not describe its bytes.
    #[error("invalid delimiter layout for sequence number {sequence}: {detail}")]
    InvalidDelimiterLayout { sequence: u64, detail: String },

    /// A trailing offset was supplied for a buffer that has no delimiter.
    #[error("sequence number {sequence} has no tuple delimiter, so it has no trailing offset")]
    TrailingOffsetOnAnchorless { sequence: u64 },

    /// A buffer arrived after the stream was declared finished.
    #[error("stream already finished at sequence number {last}")]
    StreamAlreadyFinished { last: u64 },

    /// A buffer carries a sequence number below the partition's first one.
    #[error("sequence number {sequence} precedes the first sequence number {first}")]
    SequenceBeforeStreamStart { sequence: u64, first: u64 },

    /// The stream end was declared below an already registered buffer.
    #[error("sequence number {sequence} was registered beyond the declared stream end {last}")]
    SequenceBeyondStreamEnd { sequence: u64, last: u64 },

    // === Configuration ===
    /// Configuration values are inconsistent.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    // === Shutdown Checks ===
    /// Spanning records were registered but never handed to a caller.
    #[error("{count} unresolved spanning record(s) at shutdown: {detail}")]
    UnresolvedSpanningRecords { count: usize, detail: String },

    // === Formatting ===
    /// A buffer handle does not refer to a live pooled buffer.
    #[error("unknown buffer handle {handle}")]
    UnknownBuffer { handle: u64 },

    /// A buffer claimed to contain a delimiter but none was found.
    #[error("buffer for sequence number {sequence} has no tuple delimiter")]
    DelimiterMissing { sequence: u64 },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classes, stable for logs and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Internal logic error.
    Internal = 2,
    /// The ingestion pipeline used the API incorrectly.
    Misuse = 21,
    /// Configuration rejected.
    Config = 22,
    /// A correctness check failed at shutdown.
    Leak = 23,
    /// A referenced buffer or delimiter was not found.
    NotFound = 12,
}

impl SpanweaveError {
    /// Map this error to its coarse class.
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateRegistration { .. }
            | Self::ConflictingTrailingOffset { .. }
            | Self::NotRegistered { .. }
            | Self::InvalidDelimiterLayout { .. }
            | Self::TrailingOffsetOnAnchorless { .. }
            | Self::StreamAlreadyFinished { .. }
            | Self::SequenceBeforeStreamStart { .. }
            | Self::SequenceBeyondStreamEnd { .. } => ErrorCode::Misuse,
            Self::InvalidConfig { .. } => ErrorCode::Config,
            Self::UnresolvedSpanningRecords { .. } => ErrorCode::Leak,
            Self::UnknownBuffer { .. } | Self::DelimiterMissing { .. } => ErrorCode::NotFound,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error indicates a bug in the calling pipeline.
    pub const fn is_misuse(&self) -> bool {
        matches!(self.error_code(), ErrorCode::Misuse)
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Always false: transient conditions are values, not errors.
    pub const fn is_transient(&self) -> bool {
        false
    }

    /// Get the process exit code for this error.
    pub const fn exit_code(&self) -> i32 {
        self.error_code() as i32
    }

    /// Create an internal error.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Create a configuration error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `SpanweaveError`.
pub type Result<T> = std::result::Result<T, SpanweaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misuse_variants_classify_as_misuse() {
        let errors = [
            SpanweaveError::DuplicateRegistration { sequence: 3 },
            SpanweaveError::ConflictingTrailingOffset {
                sequence: 3,
                existing: 1,
                requested: 2,
            },
            SpanweaveError::NotRegistered { sequence: 9 },
            SpanweaveError::TrailingOffsetOnAnchorless { sequence: 4 },
            SpanweaveError::StreamAlreadyFinished { last: 10 },
        ];
        for err in errors {
            assert!(err.is_misuse(), "{err} should be misuse");
            assert!(!err.is_transient());
            assert_eq!(err.exit_code(), 21);
        }
    }

    #[test]
    fn display_carries_structured_fields() {
        let err = SpanweaveError::ConflictingTrailingOffset {
            sequence: 7,
            existing: 12,
            requested: 40,
        };
        let text = err.to_string();
        assert!(text.contains("sequence number 7"));
        assert!(text.contains("already 12"));
        assert!(text.contains("requested 40"));
    }

    #[test]
    fn leak_and_config_codes() {
        let leak = SpanweaveError::UnresolvedSpanningRecords {
            count: 1,
            detail: "seq=4".to_owned(),
        };
        assert_eq!(leak.error_code(), ErrorCode::Leak);
        assert!(!leak.is_misuse());
        assert_eq!(
            SpanweaveError::config("capacity must be >= 2").error_code(),
            ErrorCode::Config
        );
        assert_eq!(
            SpanweaveError::internal("boom").to_string(),
            "internal error: boom"
        );
    }
}
