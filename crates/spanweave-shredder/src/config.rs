use serde::{Deserialize, Serialize};
use spanweave_error::{Result, SpanweaveError};
use spanweave_types::SequenceNumber;

const DEFAULT_DELIMITER_SIZE_IN_BYTES: u32 = 1;
const DEFAULT_INITIAL_CAPACITY: usize = 1024;
const DEFAULT_MAX_CAPACITY: usize = 1 << 20;
const DEFAULT_GROWTH_THRESHOLD: u64 = 32;
const MIN_CAPACITY: usize = 2;

/// What dropping a tracker does when spanning records were never resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakPolicy {
    /// Report every unresolved slot through `tracing::error!`.
    #[default]
    Log,
    /// Log, then panic unless the thread is already unwinding.
    Panic,
}

/// Tracker configuration.
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```toml
/// delimiter_size_in_bytes = 2
/// initial_capacity = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShredderConfig {
    /// Size of the tuple delimiter in bytes.
    pub delimiter_size_in_bytes: u32,
    /// Slot count of the ring at construction.
    pub initial_capacity: usize,
    /// Upper bound for ring growth.
    pub max_capacity: usize,
    /// Out-of-range results since the last growth that trigger the next
    /// one. Zero keeps the capacity fixed.
    pub growth_threshold: u64,
    /// First sequence number of the partition. Its buffer has no leading
    /// spanning record.
    pub first_sequence_number: SequenceNumber,
    pub leak_policy: LeakPolicy,
}

impl Default for ShredderConfig {
    fn default() -> Self {
        Self {
            delimiter_size_in_bytes: DEFAULT_DELIMITER_SIZE_IN_BYTES,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_capacity: DEFAULT_MAX_CAPACITY,
            growth_threshold: DEFAULT_GROWTH_THRESHOLD,
            first_sequence_number: SequenceNumber::INITIAL,
            leak_policy: LeakPolicy::Log,
        }
    }
}

impl ShredderConfig {
    /// Defaults with the given delimiter size.
    #[must_use]
    pub fn with_delimiter_size(delimiter_size_in_bytes: u32) -> Self {
        Self {
            delimiter_size_in_bytes,
            ..Self::default()
        }
    }

    /// Fixed capacity, growth disabled.
    #[must_use]
    pub fn fixed_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self.max_capacity = capacity;
        self.growth_threshold = 0;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.delimiter_size_in_bytes == 0 {
            return Err(SpanweaveError::config(
                "delimiter_size_in_bytes must be at least 1",
            ));
        }
        if self.initial_capacity < MIN_CAPACITY {
            return Err(SpanweaveError::config(format!(
                "initial_capacity must be >= {MIN_CAPACITY}, got {}",
                self.initial_capacity
            )));
        }
        if self.max_capacity < self.initial_capacity {
            return Err(SpanweaveError::config(format!(
                "max_capacity {} is below initial_capacity {}",
                self.max_capacity, self.initial_capacity
            )));
        }
        Ok(())
    }

    /// Whether out-of-range results may grow the ring.
    #[must_use]
    pub const fn growth_enabled(&self) -> bool {
        self.growth_threshold > 0 && self.max_capacity > self.initial_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ShredderConfig::default();
        config.validate().expect("defaults must validate");
        assert_eq!(config.delimiter_size_in_bytes, 1);
        assert_eq!(config.initial_capacity, 1024);
        assert!(config.growth_enabled());
    }

    #[test]
    fn rejects_degenerate_values() {
        let mut config = ShredderConfig::with_delimiter_size(0);
        assert!(config.validate().is_err());

        config = ShredderConfig::default().fixed_capacity(1);
        assert!(config.validate().is_err());

        config = ShredderConfig {
            initial_capacity: 64,
            max_capacity: 32,
            ..ShredderConfig::default()
        };
        let err = config.validate().expect_err("max below initial");
        assert!(err.to_string().contains("max_capacity 32"));
    }

    #[test]
    fn fixed_capacity_disables_growth() {
        let config = ShredderConfig::default().fixed_capacity(8);
        assert!(!config.growth_enabled());
        config.validate().expect("valid");
    }
}
