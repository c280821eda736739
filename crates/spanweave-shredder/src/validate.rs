use std::fmt;

use serde::Serialize;
use spanweave_error::SpanweaveError;
use spanweave_types::SequenceNumber;

/// Why a slot blocks a clean shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The slot starts a spanning record whose closing buffer arrived, but
    /// the record was never handed out.
    UnclaimedRecord { closing: SequenceNumber },
    /// The slot waits for a predecessor that never arrived although later
    /// buffers did.
    MissingPredecessor { missing: SequenceNumber },
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnclaimedRecord { closing } => {
                write!(f, "spanning record closed by {closing} never claimed")
            }
            Self::MissingPredecessor { missing } => {
                write!(f, "predecessor {missing} never arrived")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnresolvedSlot {
    pub sequence: SequenceNumber,
    pub reason: UnresolvedReason,
}

/// Result of the destruction-time check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    unresolved: Vec<UnresolvedSlot>,
}

impl ValidationReport {
    pub(crate) fn push(&mut self, sequence: SequenceNumber, reason: UnresolvedReason) {
        self.unresolved.push(UnresolvedSlot { sequence, reason });
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }

    #[must_use]
    pub fn unresolved(&self) -> &[UnresolvedSlot] {
        &self.unresolved
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.unresolved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Turn a non-empty report into an error.
    pub fn into_result(self) -> spanweave_error::Result<Self> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(SpanweaveError::UnresolvedSpanningRecords {
                count: self.unresolved.len(),
                detail: self.to_string(),
            })
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.unresolved.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "seq={}: {}", slot.sequence, slot.reason)?;
        }
        Ok(())
    }
}
