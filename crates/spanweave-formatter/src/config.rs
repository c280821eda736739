use serde::{Deserialize, Serialize};
use spanweave_error::{Result, SpanweaveError};
use spanweave_shredder::ShredderConfig;

/// Formatter configuration.
///
/// ```toml
/// tuple_delimiter = "\n"
/// defer_last_delimiter = false
///
/// [shredder]
/// initial_capacity = 256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Byte sequence separating records.
    pub tuple_delimiter: String,
    /// Register buffers knowing only their first delimiter and publish the
    /// last one with the trailing request.
    pub defer_last_delimiter: bool,
    /// Tracker settings. The delimiter size is taken from `tuple_delimiter`.
    pub shredder: ShredderConfig,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            tuple_delimiter: "\n".to_owned(),
            defer_last_delimiter: false,
            shredder: ShredderConfig::default(),
        }
    }
}

impl FormatterConfig {
    #[must_use]
    pub fn with_delimiter(tuple_delimiter: impl Into<String>) -> Self {
        Self {
            tuple_delimiter: tuple_delimiter.into(),
            ..Self::default()
        }
    }

    /// Tracker settings with the delimiter size filled in.
    pub fn shredder_config(&self) -> Result<ShredderConfig> {
        let delimiter_size_in_bytes = u32::try_from(self.tuple_delimiter.len())
            .map_err(|_| SpanweaveError::config("tuple_delimiter is too long"))?;
        Ok(ShredderConfig {
            delimiter_size_in_bytes,
            ..self.shredder.clone()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.tuple_delimiter.is_empty() {
            return Err(SpanweaveError::config("tuple_delimiter must not be empty"));
        }
        self.shredder_config()?.validate()
    }
}
