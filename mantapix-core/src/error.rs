//! Error types for mantapix-core.

use thiserror::Error;

/// Result type alias for mantapix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for mantapix operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Decoded channel ids outside the instrument's channel range.
    ///
    /// The word layout does not match the assumed `nbits` / flag mode.
    #[error(
        "format violation: {count} event(s) decoded to channel ids {offending:?} (>= 49); \
         check nbits and FIFO flag mode"
    )]
    FormatViolation {
        /// Distinct offending channel ids, ascending.
        offending: Vec<u32>,
        /// Number of events carrying an offending id.
        count: usize,
    },

    /// A value that is not a valid channel id was used as one.
    #[error("invalid channel id: {0} (expected 1..=48)")]
    InvalidChannel(u32),

    /// A per-channel table was built from the wrong number of entries.
    #[error("expected {expected} channel entries, found {found}")]
    ChannelCount { expected: usize, found: usize },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Returns true if this error means the raw word layout does not match
    /// the decoder configuration.
    #[must_use]
    pub fn is_format_violation(&self) -> bool {
        matches!(self, Error::FormatViolation { .. })
    }
}
