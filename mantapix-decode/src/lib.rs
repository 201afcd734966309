//! mantapix-decode: timestamp word decoder, channel demultiplexer and
//! rollover unwrapper.
//!
//! This crate turns the raw 32-bit words of a multi-channel single-photon
//! timestamping instrument into per-channel, monotonically increasing
//! 64-bit timestamps.
//!
//! # Key Components
//!
//! - [`decode_fields`] - Splits words into counter value and detector code
//! - [`filter_events`] - Drops sentinel words, extracts FIFO-full flags
//! - [`demultiplex`] - Stable partition into 48 channel buckets
//! - [`unwrap_rollover`] - Corrects the wrapping counter per channel
//! - [`Decoder`] - Runs the whole pipeline
//!
//! # Processing Pipeline
//!
//! 1. **Sequential**: decode fields, filter, demultiplex
//! 2. **Parallel**: unwrap each channel bucket independently

mod demux;
mod fields;
mod filter;
mod pipeline;
mod rollover;

pub use demux::{demultiplex, ChannelBuckets};
pub use fields::{
    counter_mask, counter_modulus, decode_fields, decode_word, encode_word, DEFAULT_NBITS,
};
pub use filter::{
    check_channels, filter_events, ChannelCheck, BIG_FIFO_BIT, CHANNEL_MASK, SENTINEL_DETECTOR,
    SMALL_FIFO_BIT,
};
pub use pipeline::{
    decode_with_flags, decode_without_flags, DecodeOutput, DecodeStats, Decoder, FifoFlags,
};
pub use rollover::{
    count_rollovers, is_rollover, unwrap_rollover, DEFAULT_DELTA_ROLLOVER, MIN_CHANNEL_EVENTS,
};

// Re-export core types for convenience
pub use mantapix_core::{ChannelId, ChannelTable, Error, Result, NUM_CHANNELS};

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Largest supported counter width; at least one detector bit must remain.
pub const MAX_NBITS: u32 = 31;

/// Decoder configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Width of the onboard counter in bits (default: 24).
    pub nbits: u32,
    /// Largest counter drop still treated as jitter (default: 1).
    pub delta_rollover: u32,
    /// Extract big/small FIFO-full flags from bits 7 and 6.
    pub fifo_flag_mode: bool,
    /// Fail on channel ids of 49 or more instead of excluding them.
    pub debug: bool,
    /// Unwrap channels on the rayon thread pool.
    pub parallel: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            nbits: DEFAULT_NBITS,
            delta_rollover: DEFAULT_DELTA_ROLLOVER,
            fifo_flag_mode: true,
            debug: false,
            parallel: true,
        }
    }
}

#[derive(Deserialize)]
struct JsonConfig {
    #[serde(default)]
    decoder: JsonDecoder,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonDecoder {
    nbits: u32,
    delta_rollover: u32,
    fifo_flag_mode: bool,
    debug: bool,
    parallel: bool,
}

impl Default for JsonDecoder {
    fn default() -> Self {
        let defaults = DecodeConfig::default();
        Self {
            nbits: defaults.nbits,
            delta_rollover: defaults.delta_rollover,
            fifo_flag_mode: defaults.fifo_flag_mode,
            debug: defaults.debug,
            parallel: defaults.parallel,
        }
    }
}

impl DecodeConfig {
    /// Configuration for front-ends without FIFO status bits.
    #[must_use]
    pub fn without_flags() -> Self {
        Self {
            fifo_flag_mode: false,
            ..Self::default()
        }
    }

    /// Sets the strict channel check.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if the
    /// configuration is invalid.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Ok(Self::from_json_config(json_config)?)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or the configuration
    /// is invalid.
    pub fn from_json(json: &str) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Ok(Self::from_json_config(json_config)?)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let decoder = config.decoder;
        let config = Self {
            nbits: decoder.nbits,
            delta_rollover: decoder.delta_rollover,
            fifo_flag_mode: decoder.fifo_flag_mode,
            debug: decoder.debug,
            parallel: decoder.parallel,
        };

        // Validate once at load time
        config.validate()?;
        Ok(config)
    }

    /// Checks that `nbits` and `delta_rollover` are usable.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for `nbits` outside `1..=31` or a
    /// zero `delta_rollover`.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_NBITS).contains(&self.nbits) {
            return Err(Error::ConfigError(format!(
                "nbits must be in 1..={MAX_NBITS}, got {}",
                self.nbits
            )));
        }
        if self.delta_rollover == 0 {
            return Err(Error::ConfigError(
                "delta_rollover must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Counter modulus `2^nbits`.
    #[must_use]
    pub fn modulus(&self) -> i64 {
        counter_modulus(self.nbits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecodeConfig::default();
        assert_eq!(config.nbits, 24);
        assert_eq!(config.delta_rollover, 1);
        assert!(config.fifo_flag_mode);
        assert!(!config.debug);
        assert_eq!(config.modulus(), 16_777_216);
        assert!(config.validate().is_ok());

        assert!(!DecodeConfig::without_flags().fifo_flag_mode);
    }

    #[test]
    fn test_json_loading() {
        let json = r#"{
            "decoder": {
                "nbits": 20,
                "delta_rollover": 4,
                "fifo_flag_mode": false,
                "debug": true,
                "parallel": false
            }
        }"#;

        let config = DecodeConfig::from_json(json).expect("Failed to parse JSON");
        assert_eq!(config.nbits, 20);
        assert_eq!(config.delta_rollover, 4);
        assert!(!config.fifo_flag_mode);
        assert!(config.debug);
        assert!(!config.parallel);
    }

    #[test]
    fn test_json_partial_config() {
        let json = r#"{ "decoder": { "debug": true } }"#;
        let config = DecodeConfig::from_json(json).expect("Should parse partial config");
        assert!(config.debug);
        assert_eq!(config.nbits, 24); // Default
        assert!(config.fifo_flag_mode); // Default

        let config = DecodeConfig::from_json("{}").expect("Should parse empty config");
        assert_eq!(config, DecodeConfig::default());
    }

    #[test]
    fn test_json_invalid_nbits() {
        let json = r#"{ "decoder": { "nbits": 32 } }"#;
        let err = DecodeConfig::from_json(json).unwrap_err().to_string();
        assert!(err.contains("nbits"), "Error should mention nbits: {err}");

        let json = r#"{ "decoder": { "nbits": 0 } }"#;
        assert!(DecodeConfig::from_json(json).is_err());
    }

    #[test]
    fn test_zero_delta_rejected() {
        let config = DecodeConfig {
            delta_rollover: 0,
            ..DecodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }
}
