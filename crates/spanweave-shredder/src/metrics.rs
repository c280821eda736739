//! Tracker observability counters.
//!
//! Counters are owned by one tracker instance and updated with relaxed
//! atomics; a snapshot is a plain serializable value.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct ShredderMetrics {
    registrations: AtomicU64,
    leading_resolutions: AtomicU64,
    trailing_resolutions: AtomicU64,
    spanning_records: AtomicU64,
    claim_races_lost: AtomicU64,
    out_of_range: AtomicU64,
    ring_growths: AtomicU64,
    claim_rollbacks: AtomicU64,
    lazy_offsets: AtomicU64,
}

/// Point-in-time copy of a tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ShredderMetricsSnapshot {
    /// Buffers registered through `resolve_leading`.
    pub registrations: u64,
    pub leading_resolutions: u64,
    pub trailing_resolutions: u64,
    /// Spanning records handed to a caller (two or more buffers).
    pub spanning_records: u64,
    /// Complete records found by a walk but claimed by another thread first.
    pub claim_races_lost: u64,
    /// Results with `is_in_range == false`.
    pub out_of_range: u64,
    pub ring_growths: u64,
    /// Two-slot claims undone because the second CAS failed.
    pub claim_rollbacks: u64,
    /// Last delimiter offsets published after registration.
    pub lazy_offsets: u64,
}

impl ShredderMetrics {
    pub(crate) fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_leading(&self) {
        self.leading_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_trailing(&self) {
        self.trailing_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spanning_record(&self) {
        self.spanning_records.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_claim_race_lost(&self) {
        self.claim_races_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_out_of_range(&self) {
        self.out_of_range.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_growth(&self) {
        self.ring_growths.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.claim_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lazy_offset(&self) {
        self.lazy_offsets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ShredderMetricsSnapshot {
        ShredderMetricsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            leading_resolutions: self.leading_resolutions.load(Ordering::Relaxed),
            trailing_resolutions: self.trailing_resolutions.load(Ordering::Relaxed),
            spanning_records: self.spanning_records.load(Ordering::Relaxed),
            claim_races_lost: self.claim_races_lost.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            ring_growths: self.ring_growths.load(Ordering::Relaxed),
            claim_rollbacks: self.claim_rollbacks.load(Ordering::Relaxed),
            lazy_offsets: self.lazy_offsets.load(Ordering::Relaxed),
        }
    }
}
