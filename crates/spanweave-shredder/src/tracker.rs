//! The spanning-tuple tracker.
//!
//! Buffers of one partition arrive on many threads in any order. Each
//! buffer is registered in the slot of its sequence number; afterwards the
//! registering thread walks to its neighbours to find out whether a tuple
//! split across buffer boundaries became complete. A complete spanning
//! record is claimed by CAS on the slot state words, so exactly one thread
//! receives it.
//!
//! The slot array is a ring covering `[tail, tail + capacity)`. The tail
//! moves forward over slots whose fragments were both handed out; the ring
//! doubles (up to a bound) when callers keep hitting its end.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use spanweave_error::{Result, SpanweaveError};
use spanweave_types::{SequenceNumber, SequenceShredderResult, SpanningBuffers, StagedBuffer};
use tracing::{debug, error, info, trace, warn};

use crate::config::{LeakPolicy, ShredderConfig};
use crate::metrics::{ShredderMetrics, ShredderMetricsSnapshot};
use crate::ring::Ring;
use crate::slot::{OffsetPublish, SlotFlags, SlotWord};
use crate::validate::{UnresolvedReason, ValidationReport};

const STREAM_OPEN: u64 = u64::MAX;
const DISPLAY_ROW_LIMIT: u64 = 64;

/// Why a walk over neighbouring slots stopped without finding the partner
/// slot of a spanning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkStop {
    /// A slot on the way has not arrived, or an anchor's last delimiter is
    /// still unknown.
    Pending,
    /// The record was already handed to another caller.
    Claimed,
    /// The walk left the live window.
    OutOfRange,
}

type Walk<T> = std::result::Result<T, WalkStop>;

/// Lock-free tracker of tuples that span raw buffer boundaries.
///
/// Shared by reference between all threads formatting one partition.
pub struct SequenceShredder {
    config: ShredderConfig,
    ring: RwLock<Ring>,
    tail: AtomicU64,
    /// One past the highest registered sequence number.
    high_water: AtomicU64,
    out_of_range_since_growth: AtomicU64,
    stream_end: AtomicU64,
    metrics: ShredderMetrics,
    closed: bool,
}

impl SequenceShredder {
    /// Tracker with default settings for a delimiter of the given size.
    ///
    /// # Panics
    ///
    /// Panics if `delimiter_size_in_bytes` is zero.
    #[must_use]
    pub fn new(delimiter_size_in_bytes: u32) -> Self {
        assert!(
            delimiter_size_in_bytes > 0,
            "tuple delimiter must be at least one byte"
        );
        Self::build(ShredderConfig::with_delimiter_size(delimiter_size_in_bytes))
    }

    pub fn with_config(config: ShredderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ShredderConfig) -> Self {
        let first = config.first_sequence_number;
        info!(
            capacity = config.initial_capacity,
            max_capacity = config.max_capacity,
            delimiter_size = config.delimiter_size_in_bytes,
            first_sequence = %first,
            "sequence shredder created"
        );
        Self {
            ring: RwLock::new(Ring::new(config.initial_capacity, first)),
            tail: AtomicU64::new(first.get()),
            high_water: AtomicU64::new(first.get()),
            out_of_range_since_growth: AtomicU64::new(0),
            stream_end: AtomicU64::new(STREAM_OPEN),
            metrics: ShredderMetrics::default(),
            closed: false,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn config(&self) -> &ShredderConfig {
        &self.config
    }

    /// Current slot count of the ring.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.read().capacity()
    }

    /// Oldest sequence number that has not reached its terminal state.
    #[must_use]
    pub fn tail(&self) -> SequenceNumber {
        SequenceNumber::new(self.tail.load(Ordering::SeqCst))
    }

    /// The last sequence number of the stream, once declared.
    #[must_use]
    pub fn stream_end(&self) -> Option<SequenceNumber> {
        match self.stream_end.load(Ordering::SeqCst) {
            STREAM_OPEN => None,
            last => Some(SequenceNumber::new(last)),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> ShredderMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn first_sequence(&self) -> SequenceNumber {
        self.config.first_sequence_number
    }

    fn high_water(&self) -> SequenceNumber {
        SequenceNumber::new(self.high_water.load(Ordering::SeqCst))
    }

    /// Slots that may open a spanning record: buffers with a delimiter, and
    /// the first buffer of the partition.
    fn is_anchor(&self, sequence: SequenceNumber, word: SlotWord) -> bool {
        word.has_delimiter() || sequence == self.first_sequence()
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Whether `sequence` currently falls inside the live window.
    ///
    /// Tries to move the tail forward first. Never blocks: while the ring is
    /// being resized the answer is `false`.
    pub fn is_in_range(&self, sequence: SequenceNumber) -> bool {
        let in_range = match self.ring.try_read() {
            Some(ring) => {
                self.advance_tail(&ring);
                ring.covers(self.tail(), sequence)
            }
            None => false,
        };
        if !in_range && sequence >= self.tail() {
            self.note_out_of_range(sequence);
        }
        in_range
    }

    /// Register `buffer` and resolve the spanning record that ends in it.
    ///
    /// Returns `is_in_range == false` without registering when the sequence
    /// number is outside the live window (or the ring is being resized); the
    /// caller retries later. Otherwise the buffer is registered and the
    /// result holds:
    /// - nothing, if the record is not complete yet or went to another caller,
    /// - only `buffer`, for the first buffer of the partition,
    /// - the buffers of the spanning record this caller now owns, ending in
    ///   `buffer` or, for a buffer without delimiter, passing through it.
    ///
    /// A registered buffer is always reported in range. When the walk of a
    /// buffer without delimiter leaves the window, the record stays with
    /// whoever completes it, but the miss still counts towards growth.
    ///
    /// Only the partition's first buffer can wait for a resize to finish.
    pub fn resolve_leading(&self, buffer: StagedBuffer) -> Result<SequenceShredderResult> {
        let sequence = buffer.sequence();
        buffer.validate(self.config.delimiter_size_in_bytes)?;
        self.check_stream_bounds(sequence)?;

        let (result, walk_left_window) = {
            // The first buffer is always inside the window; it waits out a
            // resize instead of being sent back.
            let ring = if sequence == self.first_sequence() {
                self.ring.read()
            } else if let Some(ring) = self.ring.try_read() {
                ring
            } else {
                self.metrics.record_out_of_range();
                trace!(sequence = %sequence, "ring resize in progress");
                return Ok(SequenceShredderResult::out_of_range());
            };
            self.resolve_leading_in(&ring, &buffer)?
        };
        if !result.is_in_range || walk_left_window {
            self.note_out_of_range(sequence);
        }
        Ok(result)
    }

    /// Resolve the spanning record that starts in (or passes through) the
    /// already registered buffer `sequence`.
    ///
    /// Takes the shared side of the ring lock and so waits while the ring
    /// is being resized. A resize only relocates registered slots and never
    /// waits on callers.
    pub fn resolve_trailing(&self, sequence: SequenceNumber) -> Result<SequenceShredderResult> {
        self.resolve_trailing_impl(sequence, None)
    }

    /// Like [`resolve_trailing`](Self::resolve_trailing), but first publishes
    /// the offset of the buffer's last delimiter, which was unknown at
    /// registration.
    ///
    /// The offset is set once. Repeating the same offset is allowed; a
    /// different one is rejected with `ConflictingTrailingOffset`.
    pub fn resolve_trailing_with_offset(
        &self,
        sequence: SequenceNumber,
        offset_of_last_delimiter: u32,
    ) -> Result<SequenceShredderResult> {
        self.resolve_trailing_impl(sequence, Some(offset_of_last_delimiter))
    }

    /// Declare `last` the final buffer of the stream and hand out the
    /// trailing record it ends, which no delimiter terminates.
    ///
    /// Returns the buffers from the record's start anchor up to `last`
    /// (only `last` itself when it is the anchor), or nothing when the
    /// record cannot be assembled because a buffer is missing. Later
    /// registrations beyond `last` fail with `StreamAlreadyFinished`.
    pub fn finish_stream(&self, last: SequenceNumber) -> Result<SpanningBuffers> {
        if let Some(previous) = self.stream_end() {
            return Err(SpanweaveError::StreamAlreadyFinished {
                last: previous.get(),
            });
        }
        let ring = self.ring.read();
        let highest = self.high_water();
        if highest > last.next() {
            return Err(SpanweaveError::SequenceBeyondStreamEnd {
                sequence: highest.get() - 1,
                last: last.get(),
            });
        }
        let tail = self.tail();
        let word = ring
            .covers(tail, last)
            .then(|| ring.arrived(last))
            .flatten()
            .ok_or(SpanweaveError::NotRegistered {
                sequence: last.get(),
            })?;
        if word.has_delimiter() && !word.flags().contains(SlotFlags::TRAILING_READY) {
            return Err(SpanweaveError::InvalidDelimiterLayout {
                sequence: last.get(),
                detail: "last delimiter offset unknown at stream end".to_owned(),
            });
        }
        self.stream_end
            .compare_exchange(STREAM_OPEN, last.get(), Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|existing| SpanweaveError::StreamAlreadyFinished { last: existing })?;

        let start = if self.is_anchor(last, word) {
            last
        } else {
            match self.walk_back(&ring, last) {
                Ok(start) => start,
                Err(stop) => {
                    warn!(last = %last, ?stop, "final trailing record cannot be assembled");
                    return Ok(SpanningBuffers::empty());
                }
            }
        };
        let buffers = collect_descriptors(&ring, start, last);
        if buffers.len() as u64 != last.get() - start.get() + 1 {
            return Err(SpanweaveError::internal(format!(
                "slot between {start} and {last} vanished during stream finish"
            )));
        }
        if !ring
            .slot(start)
            .try_claim(ring.lap(start), SlotFlags::TRAILING_CLAIMED)
        {
            debug!(start = %start, last = %last, "final trailing record already claimed");
            return Ok(SpanningBuffers::empty());
        }
        self.claim_links(&ring, start.next(), last.next());
        info!(
            last = %last,
            start = %start,
            buffers = buffers.len(),
            "stream finished"
        );
        self.advance_tail(&ring);
        Ok(buffers)
    }

    /// Check that every registered record was handed out.
    ///
    /// Reports start anchors whose closing buffer arrived but whose record
    /// was never claimed, and slots waiting on a predecessor that never
    /// arrived below the highest registered sequence number. A trailing
    /// fragment with no successor yet is the open end of the stream, not a
    /// leak.
    #[must_use]
    pub fn validate_state(&self) -> ValidationReport {
        let ring = self.ring.read();
        self.advance_tail(&ring);
        let tail = self.tail();
        let high_water = self.high_water();
        let mut report = ValidationReport::default();

        let mut sequence = tail;
        while sequence < high_water && ring.covers(tail, sequence) {
            if let Some(word) = ring.arrived(sequence) {
                let flags = word.flags();
                if !flags.contains(SlotFlags::LEADING_CLAIMED) && sequence != self.first_sequence() {
                    if let Some(missing) = sequence.prev().filter(|prev| {
                        *prev >= tail && ring.arrived(*prev).is_none()
                    }) {
                        report.push(sequence, UnresolvedReason::MissingPredecessor { missing });
                    }
                }
                if self.is_anchor(sequence, word) && !flags.contains(SlotFlags::TRAILING_CLAIMED) {
                    if let Some(closing) = arrived_closing(&ring, sequence, high_water) {
                        report.push(sequence, UnresolvedReason::UnclaimedRecord { closing });
                    }
                }
            }
            sequence = sequence.next();
        }
        report
    }

    /// Validate and shut down.
    pub fn close(mut self) -> Result<ValidationReport> {
        let report = self.validate_state();
        self.closed = true;
        if !report.is_clean() {
            error!(
                unresolved = report.len(),
                detail = %report,
                "sequence shredder closed with unresolved spanning records"
            );
        }
        report.into_result()
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    fn check_stream_bounds(&self, sequence: SequenceNumber) -> Result<()> {
        let first = self.first_sequence();
        if sequence < first {
            return Err(SpanweaveError::SequenceBeforeStreamStart {
                sequence: sequence.get(),
                first: first.get(),
            });
        }
        match self.stream_end() {
            Some(last) if sequence > last => Err(SpanweaveError::StreamAlreadyFinished {
                last: last.get(),
            }),
            _ => Ok(()),
        }
    }

    /// The result, and whether a walk of the registered buffer left the
    /// window.
    fn resolve_leading_in(
        &self,
        ring: &Ring,
        buffer: &StagedBuffer,
    ) -> Result<(SequenceShredderResult, bool)> {
        let sequence = buffer.sequence();
        self.advance_tail(ring);
        let tail = self.tail();
        if sequence < tail {
            // Everything below the tail was registered and fully claimed.
            return Err(SpanweaveError::DuplicateRegistration {
                sequence: sequence.get(),
            });
        }
        if !ring.covers(tail, sequence) {
            return Ok((SequenceShredderResult::out_of_range(), false));
        }

        let word = self.register(ring, buffer)?;
        self.metrics.record_leading();
        if sequence == self.first_sequence() {
            let own = SpanningBuffers::single(*buffer);
            return Ok((SequenceShredderResult::in_range(own), false));
        }

        let chain = if word.has_delimiter() {
            self.walk_back(ring, sequence).map(|start| (start, sequence))
        } else {
            self.walk_chain(ring, sequence)
        };
        let walk_left_window = matches!(chain, Err(WalkStop::OutOfRange));
        let record = chain
            .ok()
            .and_then(|(start, end)| self.claim_record(ring, start, end));
        // Registered either way: an incomplete record is picked up by whoever
        // completes it.
        let result = SequenceShredderResult::in_range(record.unwrap_or_default());
        Ok((result, walk_left_window))
    }

    fn resolve_trailing_impl(
        &self,
        sequence: SequenceNumber,
        offset: Option<u32>,
    ) -> Result<SequenceShredderResult> {
        let result = {
            let ring = self.ring.read();
            self.resolve_trailing_in(&ring, sequence, offset)?
        };
        if !result.is_in_range {
            self.note_out_of_range(sequence);
        }
        Ok(result)
    }

    fn resolve_trailing_in(
        &self,
        ring: &Ring,
        sequence: SequenceNumber,
        offset: Option<u32>,
    ) -> Result<SequenceShredderResult> {
        let tail = self.tail();
        if sequence < tail {
            // Recycled: both fragments were already handed out.
            return Ok(SequenceShredderResult::out_of_range());
        }
        let not_registered = SpanweaveError::NotRegistered {
            sequence: sequence.get(),
        };
        if !ring.covers(tail, sequence) {
            return Err(not_registered);
        }
        let Some(mut word) = ring.arrived(sequence) else {
            return Err(not_registered);
        };

        match offset {
            Some(last) => word = self.publish_last_delimiter(ring, sequence, word, last)?,
            None if word.has_delimiter() && !word.flags().contains(SlotFlags::TRAILING_READY) => {
                return Err(SpanweaveError::InvalidDelimiterLayout {
                    sequence: sequence.get(),
                    detail: "last delimiter offset unknown; supply it with the trailing request"
                        .to_owned(),
                });
            }
            None => {}
        }
        self.metrics.record_trailing();

        let flags = word.flags();
        let walk = if self.is_anchor(sequence, word) {
            if flags.contains(SlotFlags::TRAILING_CLAIMED) {
                return Ok(SequenceShredderResult::unresolved());
            }
            self.walk_forward(ring, sequence)
                .map(|end| (sequence, end))
        } else {
            if flags.intersects(SlotFlags::LEADING_CLAIMED | SlotFlags::TRAILING_CLAIMED) {
                return Ok(SequenceShredderResult::unresolved());
            }
            self.walk_chain(ring, sequence)
        };

        Ok(match walk {
            Ok((start, end)) => SequenceShredderResult::in_range(
                self.claim_record(ring, start, end).unwrap_or_default(),
            ),
            Err(WalkStop::OutOfRange) => SequenceShredderResult::out_of_range(),
            Err(_) => SequenceShredderResult::unresolved(),
        })
    }

    fn register(&self, ring: &Ring, buffer: &StagedBuffer) -> Result<SlotWord> {
        let sequence = buffer.sequence();
        let lap = ring.lap(sequence);
        let slot = ring.slot(sequence);
        slot.reserve(lap)
            .map_err(|_| SpanweaveError::DuplicateRegistration {
                sequence: sequence.get(),
            })?;
        let extra = if sequence == self.first_sequence() {
            // The stream start has no leading record to hand out.
            SlotFlags::LEADING_CLAIMED
        } else {
            SlotFlags::empty()
        };
        let word = slot.publish(lap, buffer, extra);
        self.high_water.fetch_max(sequence.get() + 1, Ordering::SeqCst);
        self.metrics.record_registration();
        trace!(
            sequence = %sequence,
            handle = %buffer.handle(),
            has_delimiter = buffer.has_delimiter(),
            "buffer registered"
        );
        Ok(word)
    }

    fn publish_last_delimiter(
        &self,
        ring: &Ring,
        sequence: SequenceNumber,
        word: SlotWord,
        last: u32,
    ) -> Result<SlotWord> {
        if !word.has_delimiter() {
            return Err(SpanweaveError::TrailingOffsetOnAnchorless {
                sequence: sequence.get(),
            });
        }
        let slot = ring.slot(sequence);
        slot.descriptor(sequence, word)
            .with_last_delimiter(last)
            .validate(self.config.delimiter_size_in_bytes)?;
        match slot.publish_last_delimiter(ring.lap(sequence), last) {
            OffsetPublish::Published(word) => {
                self.metrics.record_lazy_offset();
                debug!(sequence = %sequence, last, "last delimiter offset published");
                Ok(word)
            }
            OffsetPublish::AlreadySet(word) => Ok(word),
            OffsetPublish::Conflict { existing } => Err(SpanweaveError::ConflictingTrailingOffset {
                sequence: sequence.get(),
                existing,
                requested: last,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Walks
    // -----------------------------------------------------------------------

    /// Walk towards older slots until the start anchor of the record that
    /// `from` closes or passes through.
    fn walk_back(&self, ring: &Ring, from: SequenceNumber) -> Walk<SequenceNumber> {
        let tail = self.tail();
        let mut current = from;
        for _ in 0..ring.capacity() {
            let prev = current.prev().ok_or(WalkStop::OutOfRange)?;
            if prev < tail {
                return Err(WalkStop::OutOfRange);
            }
            let word = ring.arrived(prev).ok_or(WalkStop::Pending)?;
            let flags = word.flags();
            if self.is_anchor(prev, word) {
                return if flags.contains(SlotFlags::TRAILING_CLAIMED) {
                    Err(WalkStop::Claimed)
                } else if flags.contains(SlotFlags::TRAILING_READY) {
                    Ok(prev)
                } else {
                    Err(WalkStop::Pending)
                };
            }
            if flags.intersects(SlotFlags::LEADING_CLAIMED | SlotFlags::TRAILING_CLAIMED) {
                return Err(WalkStop::Claimed);
            }
            current = prev;
        }
        Err(WalkStop::OutOfRange)
    }

    /// Walk towards newer slots until the buffer closing the record that
    /// starts in or passes through `from`.
    fn walk_forward(&self, ring: &Ring, from: SequenceNumber) -> Walk<SequenceNumber> {
        let tail = self.tail();
        let mut current = from;
        loop {
            let next = current.checked_add(1).ok_or(WalkStop::OutOfRange)?;
            if !ring.covers(tail, next) {
                return Err(WalkStop::OutOfRange);
            }
            let word = ring.arrived(next).ok_or(WalkStop::Pending)?;
            let flags = word.flags();
            if word.has_delimiter() {
                return if flags.contains(SlotFlags::LEADING_CLAIMED) {
                    Err(WalkStop::Claimed)
                } else {
                    Ok(next)
                };
            }
            if flags.intersects(SlotFlags::LEADING_CLAIMED | SlotFlags::TRAILING_CLAIMED) {
                return Err(WalkStop::Claimed);
            }
            current = next;
        }
    }

    /// Both ends of the record an interior link belongs to.
    fn walk_chain(&self, ring: &Ring, link: SequenceNumber) -> Walk<(SequenceNumber, SequenceNumber)> {
        let start = self.walk_back(ring, link)?;
        let end = self.walk_forward(ring, link)?;
        Ok((start, end))
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    /// Claim the record from `start`'s trailing fragment to `end`'s leading
    /// fragment. `None` if another caller got it first.
    ///
    /// Descriptors are read before claiming. No slot of the chain can be
    /// recycled before its start anchor is claimed, so a successful claim
    /// validates them.
    fn claim_record(
        &self,
        ring: &Ring,
        start: SequenceNumber,
        end: SequenceNumber,
    ) -> Option<SpanningBuffers> {
        let buffers = collect_descriptors(ring, start, end);
        if buffers.len() as u64 != end.get() - start.get() + 1 {
            return None;
        }

        let start_lap = ring.lap(start);
        if !ring
            .slot(start)
            .try_claim(start_lap, SlotFlags::TRAILING_CLAIMED)
        {
            self.metrics.record_claim_race_lost();
            debug!(start = %start, end = %end, "spanning record claimed by another caller");
            return None;
        }
        if !ring
            .slot(end)
            .try_claim(ring.lap(end), SlotFlags::LEADING_CLAIMED)
        {
            let restored = ring
                .slot(start)
                .release_claim(start_lap, SlotFlags::TRAILING_CLAIMED);
            self.metrics.record_rollback();
            error!(
                start = %start,
                end = %end,
                restored,
                "closing slot already claimed after its start anchor was won, rolled back"
            );
            return None;
        }
        self.claim_links(ring, start.next(), end);

        self.metrics.record_spanning_record();
        trace!(
            start = %start,
            end = %end,
            buffers = buffers.len(),
            "spanning record claimed"
        );
        Some(buffers)
    }

    /// Mark the interior links in `[from, until)` handed out on both sides.
    fn claim_links(&self, ring: &Ring, from: SequenceNumber, until: SequenceNumber) {
        let mut link = from;
        while link < until {
            if !ring.slot(link).try_claim(
                ring.lap(link),
                SlotFlags::LEADING_CLAIMED | SlotFlags::TRAILING_CLAIMED,
            ) {
                error!(link = %link, "interior link claimed twice");
            }
            link = link.next();
        }
    }

    // -----------------------------------------------------------------------
    // Range management
    // -----------------------------------------------------------------------

    /// Move the tail over slots whose fragments were both handed out.
    fn advance_tail(&self, ring: &Ring) {
        let mut tail = self.tail.load(Ordering::SeqCst);
        loop {
            let sequence = SequenceNumber::new(tail);
            if !ring.slot(sequence).load().is_terminal_in(ring.lap(sequence)) {
                return;
            }
            match self
                .tail
                .compare_exchange(tail, tail + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => tail += 1,
                Err(observed) => tail = observed,
            }
        }
    }

    fn note_out_of_range(&self, sequence: SequenceNumber) {
        self.metrics.record_out_of_range();
        debug!(sequence = %sequence, tail = %self.tail(), "sequence number outside live window");
        if !self.config.growth_enabled() {
            return;
        }
        let pending = self
            .out_of_range_since_growth
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        if pending >= self.config.growth_threshold {
            self.try_grow();
        }
    }

    /// Double the ring unless another thread holds it. Never waits.
    fn try_grow(&self) {
        let Some(mut ring) = self.ring.try_write() else {
            return;
        };
        if self.out_of_range_since_growth.load(Ordering::Relaxed) < self.config.growth_threshold {
            // Another thread grew the ring meanwhile.
            return;
        }
        self.out_of_range_since_growth.store(0, Ordering::Relaxed);
        let old_capacity = ring.capacity();
        if old_capacity >= self.config.max_capacity {
            warn!(
                capacity = old_capacity,
                "sequence ring at max capacity, not growing"
            );
            return;
        }
        let new_capacity = old_capacity.saturating_mul(2).min(self.config.max_capacity);
        let tail = self.tail();
        *ring = ring.grown(new_capacity, tail);
        self.metrics.record_growth();
        info!(
            old_capacity,
            new_capacity,
            tail = %tail,
            "sequence ring grown"
        );
    }
}

/// Descriptors of the arrived slots `[start, end]`, stopping at the first
/// slot that is not arrived.
fn collect_descriptors(ring: &Ring, start: SequenceNumber, end: SequenceNumber) -> SpanningBuffers {
    let mut buffers = SpanningBuffers::empty();
    let mut sequence = start;
    while sequence <= end {
        let Some(word) = ring.arrived(sequence) else {
            break;
        };
        buffers.push(ring.slot(sequence).descriptor(sequence, word));
        sequence = sequence.next();
    }
    buffers
}

/// The arrived buffer closing the record started by `anchor`, if every
/// slot up to it arrived.
fn arrived_closing(
    ring: &Ring,
    anchor: SequenceNumber,
    high_water: SequenceNumber,
) -> Option<SequenceNumber> {
    let mut sequence = anchor.next();
    while sequence < high_water {
        let word = ring.arrived(sequence)?;
        if word.has_delimiter() {
            return Some(sequence);
        }
        sequence = sequence.next();
    }
    None
}

impl Drop for SequenceShredder {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let report = self.validate_state();
        if report.is_clean() {
            return;
        }
        for slot in report.unresolved() {
            error!(
                sequence = %slot.sequence,
                reason = %slot.reason,
                "unresolved spanning record at tracker shutdown"
            );
        }
        if self.config.leak_policy == LeakPolicy::Panic && !std::thread::panicking() {
            panic!(
                "sequence shredder dropped with {} unresolved spanning record(s): {report}",
                report.len()
            );
        }
    }
}

impl fmt::Debug for SequenceShredder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceShredder")
            .field("capacity", &self.capacity())
            .field("tail", &self.tail())
            .field("high_water", &self.high_water())
            .field("stream_end", &self.stream_end())
            .finish_non_exhaustive()
    }
}

/// Slot occupancy of the live window, one row per sequence number.
///
/// Columns: `A` arrived, `D` has delimiter, `R` trailing fragment known,
/// `L` leading fragment claimed, `T` trailing fragment claimed.
impl fmt::Display for SequenceShredder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.ring.read();
        let tail = self.tail();
        let high_water = self.high_water();
        write!(
            f,
            "SequenceShredder(capacity: {}, tail: {tail}, high_water: {high_water}",
            ring.capacity()
        )?;
        if let Some(last) = self.stream_end() {
            write!(f, ", stream_end: {last}")?;
        }
        writeln!(f, ")")?;

        let mut sequence = tail;
        let mut rows = 0;
        while sequence < high_water && ring.covers(tail, sequence) {
            if rows == DISPLAY_ROW_LIMIT {
                let remaining = high_water.distance_from(sequence).unwrap_or(0);
                return writeln!(f, "  ... {remaining} more");
            }
            match ring.arrived(sequence) {
                Some(word) => {
                    let flags = word.flags();
                    let glyph = |flag: SlotFlags, c: char| if flags.contains(flag) { c } else { '-' };
                    writeln!(
                        f,
                        "  {sequence:>8} {}{}{}{}{}",
                        glyph(SlotFlags::ARRIVED, 'A'),
                        glyph(SlotFlags::HAS_DELIMITER, 'D'),
                        glyph(SlotFlags::TRAILING_READY, 'R'),
                        glyph(SlotFlags::LEADING_CLAIMED, 'L'),
                        glyph(SlotFlags::TRAILING_CLAIMED, 'T'),
                    )?;
                }
                None => writeln!(f, "  {sequence:>8} .....")?,
            }
            sequence = sequence.next();
            rows += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use spanweave_types::BufferHandle;

    use super::*;

    fn seq(raw: u64) -> SequenceNumber {
        SequenceNumber::new(raw)
    }

    fn delimited(raw: u64, size: u32, first: u32, last: u32) -> StagedBuffer {
        StagedBuffer::with_delimiters(seq(raw), BufferHandle::new(raw), size, first, last)
    }

    fn interior(raw: u64, size: u32) -> StagedBuffer {
        StagedBuffer::without_delimiter(seq(raw), BufferHandle::new(raw), size)
    }

    fn tracker(capacity: usize) -> SequenceShredder {
        SequenceShredder::with_config(ShredderConfig::default().fixed_capacity(capacity))
            .expect("valid config")
    }

    #[test]
    fn first_buffer_resolves_to_itself() {
        let shredder = tracker(8);
        let result = shredder
            .resolve_leading(delimited(0, 4, 1, 1))
            .expect("register");
        assert!(result.is_in_range);
        assert_eq!(result.spanning_buffers.sequence_numbers(), vec![0]);
    }

    #[test]
    fn walk_back_stops_at_pending_anchor() {
        let shredder = tracker(8);
        shredder
            .resolve_leading(StagedBuffer::new(
                seq(0),
                BufferHandle::new(0),
                8,
                spanweave_types::DelimiterLayout::Partial { first: 2 },
            ))
            .expect("register 0");
        shredder.resolve_leading(delimited(1, 4, 0, 0)).expect("register 1");
        let ring = shredder.ring.read();
        // Slot 0 has a delimiter whose last offset is still unknown.
        assert_eq!(shredder.walk_back(&ring, seq(1)), Err(WalkStop::Pending));
    }

    #[test]
    fn walk_forward_reports_window_end() {
        let shredder = tracker(4);
        shredder.resolve_leading(delimited(0, 4, 0, 0)).expect("0");
        for raw in 1..4 {
            shredder.resolve_leading(interior(raw, 4)).expect("interior");
        }
        let ring = shredder.ring.read();
        assert_eq!(shredder.walk_forward(&ring, seq(0)), Err(WalkStop::OutOfRange));
        assert_eq!(shredder.walk_back(&ring, seq(3)), Ok(seq(0)));
    }

    #[test]
    fn tail_advances_over_terminal_slots_only() {
        let shredder = tracker(4);
        shredder.resolve_leading(delimited(0, 4, 1, 1)).expect("0");
        let leading = shredder.resolve_leading(delimited(1, 4, 1, 1)).expect("1");
        assert_eq!(leading.spanning_buffers.sequence_numbers(), vec![0, 1]);
        assert_eq!(shredder.tail(), seq(0));

        let trailing = shredder.resolve_trailing(seq(0)).expect("trailing 0");
        assert!(trailing.is_in_range);
        assert!(trailing.spanning_buffers.is_empty());
        // 0 is terminal, 1 still has an open trailing fragment.
        assert!(shredder.is_in_range(seq(4)));
        assert_eq!(shredder.tail(), seq(1));
        assert!(!shredder.is_in_range(seq(5)));
    }

    #[test]
    fn display_renders_slot_flags() {
        let shredder = tracker(8);
        shredder.resolve_leading(delimited(0, 4, 1, 1)).expect("0");
        shredder.resolve_leading(interior(2, 4)).expect("2");
        let rendered = shredder.to_string();
        assert!(rendered.starts_with("SequenceShredder(capacity: 8, tail: 0, high_water: 3)"));
        assert!(rendered.contains("       0 ADRL-"), "{rendered}");
        assert!(rendered.contains("       1 ....."), "{rendered}");
        assert!(rendered.contains("       2 A-R--"), "{rendered}");
    }

    #[test]
    fn tracker_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SequenceShredder>();
    }
}
