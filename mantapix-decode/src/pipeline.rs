//! Full decode pipeline: fields, filter, demultiplex, unwrap.

use crate::demux::demultiplex;
use crate::fields::decode_fields;
use crate::filter::{check_channels, filter_events};
use crate::rollover::{count_rollovers, unwrap_rollover};
use crate::DecodeConfig;
use mantapix_core::{ChannelId, ChannelTable, DecodedFields, Result};
use rayon::prelude::*;

/// Per-channel FIFO-full flags.
///
/// Each list is aligned with the channel's raw events, so it is one entry
/// longer than the channel's unwrapped timestamps (when those are not
/// empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoFlags {
    /// Big-FIFO-full flag per raw event.
    pub big_fifo_full: ChannelTable<Vec<bool>>,
    /// Small-FIFO-full flag per raw event.
    pub small_fifo_full: ChannelTable<Vec<bool>>,
}

/// Bookkeeping for one decode call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Words handed to the decoder.
    pub total_words: usize,
    /// Words dropped as sentinels.
    pub sentinel_words: usize,
    /// Words whose channel id fell outside `1..=48`.
    pub excluded_words: usize,
    /// Raw events per channel, before unwrapping.
    pub events: ChannelTable<usize>,
    /// Counter wraps detected per channel.
    pub rollovers: ChannelTable<usize>,
}

impl DecodeStats {
    /// Events that landed in a channel bucket.
    #[must_use]
    pub fn channel_events(&self) -> usize {
        self.events.values().sum()
    }

    /// Words accounted for by sentinels, exclusions and channel events.
    ///
    /// Always equal to [`DecodeStats::total_words`].
    #[must_use]
    pub fn accounted_words(&self) -> usize {
        self.sentinel_words + self.excluded_words + self.channel_events()
    }

    /// Channels with at least one raw event.
    pub fn active_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.events
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(ch, _)| ch)
    }
}

/// Result of a decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutput {
    /// Unwrapped timestamps per channel, non-decreasing within a channel.
    pub timestamps: ChannelTable<Vec<i64>>,
    /// FIFO flags, present when flag extraction was enabled.
    pub fifo_flags: Option<FifoFlags>,
    /// Counts gathered while decoding.
    pub stats: DecodeStats,
}

impl DecodeOutput {
    /// Unwrapped timestamps of one channel.
    #[must_use]
    pub fn channel(&self, channel: ChannelId) -> &[i64] {
        &self.timestamps[channel]
    }
}

/// Timestamp stream decoder.
#[derive(Debug, Clone)]
pub struct Decoder {
    config: DecodeConfig,
}

impl Decoder {
    /// Creates a decoder after validating `config`.
    ///
    /// # Errors
    /// Returns [`mantapix_core::Error::ConfigError`] for an invalid config.
    pub fn new(config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The decoder configuration.
    #[must_use]
    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decodes a raw word buffer.
    ///
    /// # Errors
    /// Returns [`mantapix_core::Error::FormatViolation`] in debug mode if
    /// any channel id is 49 or more.
    pub fn decode(&self, words: &[u32]) -> Result<DecodeOutput> {
        let fields = decode_fields(words, self.config.nbits);
        self.decode_fields(&fields)
    }

    /// Runs the pipeline on already split fields.
    ///
    /// # Errors
    /// Returns [`mantapix_core::Error::FormatViolation`] in debug mode if
    /// any channel id is 49 or more.
    pub fn decode_fields(&self, fields: &DecodedFields) -> Result<DecodeOutput> {
        let config = &self.config;

        let events = filter_events(fields, config.fifo_flag_mode);
        if config.debug {
            check_channels(&events.channel).into_result()?;
        }

        let buckets = demultiplex(&events);
        let timestamps = self.unwrap_buckets(&buckets.timestamps)?;
        let rollovers = ChannelTable::from_fn(|ch| {
            count_rollovers(&buckets.timestamps[ch], config.delta_rollover)
        });

        let stats = DecodeStats {
            total_words: fields.len(),
            sentinel_words: events.sentinel_count,
            excluded_words: buckets.excluded,
            events: buckets.event_counts(),
            rollovers,
        };
        log::debug!(
            "decoded {} words: {} channel events, {} sentinel, {} excluded",
            stats.total_words,
            stats.channel_events(),
            stats.sentinel_words,
            stats.excluded_words
        );

        let fifo_flags = match (buckets.big_fifo_full, buckets.small_fifo_full) {
            (Some(big_fifo_full), Some(small_fifo_full)) => Some(FifoFlags {
                big_fifo_full,
                small_fifo_full,
            }),
            _ => None,
        };

        Ok(DecodeOutput {
            timestamps,
            fifo_flags,
            stats,
        })
    }

    fn unwrap_buckets(&self, raw: &ChannelTable<Vec<u32>>) -> Result<ChannelTable<Vec<i64>>> {
        let nbits = self.config.nbits;
        let delta = self.config.delta_rollover;

        if self.config.parallel {
            // Buckets are disjoint; results merge back by channel index.
            let unwrapped: Vec<Vec<i64>> = raw
                .as_slice()
                .par_iter()
                .map(|times32| unwrap_rollover(times32, nbits, delta))
                .collect();
            ChannelTable::from_vec(unwrapped)
        } else {
            Ok(ChannelTable::from_fn(|ch| {
                unwrap_rollover(&raw[ch], nbits, delta)
            }))
        }
    }
}

/// Decodes words with FIFO flag extraction, whatever `config` says.
///
/// # Errors
/// Returns an error for an invalid config or, in debug mode, a format
/// violation.
pub fn decode_with_flags(words: &[u32], config: &DecodeConfig) -> Result<DecodeOutput> {
    let decoder = Decoder::new(DecodeConfig {
        fifo_flag_mode: true,
        ..config.clone()
    })?;
    decoder.decode(words)
}

/// Decodes words without FIFO flag extraction, whatever `config` says.
///
/// # Errors
/// Returns an error for an invalid config or, in debug mode, a format
/// violation.
pub fn decode_without_flags(words: &[u32], config: &DecodeConfig) -> Result<DecodeOutput> {
    let decoder = Decoder::new(DecodeConfig {
        fifo_flag_mode: false,
        ..config.clone()
    })?;
    decoder.decode(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::encode_word;
    use mantapix_core::Error;

    fn word(channel: u32, timestamp: u32) -> u32 {
        encode_word(timestamp, channel, 24)
    }

    #[test]
    fn test_decode_single_channel() {
        let words = [
            word(3, 16_777_200),
            word(3, 16_777_210),
            word(3, 5),
            word(3, 20),
        ];
        let out = decode_with_flags(&words, &DecodeConfig::default()).unwrap();
        let ch3 = ChannelId::new(3).unwrap();
        assert_eq!(out.channel(ch3), &[16_777_210, 16_777_221, 16_777_236]);
        assert_eq!(out.stats.rollovers[ch3], 1);
        assert_eq!(out.stats.events[ch3], 4);
        assert_eq!(out.timestamps.total_len(), 3);

        let flags = out.fifo_flags.unwrap();
        assert_eq!(flags.big_fifo_full[ch3].len(), 4);
    }

    #[test]
    fn test_without_flags_has_no_flag_tables() {
        let words = [word(1, 1), word(1, 2), word(1, 3)];
        let out = decode_without_flags(&words, &DecodeConfig::default()).unwrap();
        assert!(out.fifo_flags.is_none());
        assert_eq!(out.channel(ChannelId::FIRST), &[2, 3]);
    }

    #[test]
    fn test_debug_mode_reports_violation() {
        // Detector code 60 survives the 6-bit mask
        let words = [word(1, 1), word(60, 2)];
        let config = DecodeConfig::default().with_debug(true);
        let err = decode_with_flags(&words, &config).unwrap_err();
        assert_eq!(
            err,
            Error::FormatViolation {
                offending: vec![60],
                count: 1
            }
        );

        // Lenient mode drops it
        let out = decode_with_flags(&words, &DecodeConfig::default()).unwrap();
        assert_eq!(out.stats.excluded_words, 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let words: Vec<u32> = (0..5000u32)
            .map(|i| word(1 + i % 48, (i * 7919) % (1 << 24)))
            .collect();
        let parallel = Decoder::new(DecodeConfig::default()).unwrap();
        let sequential = Decoder::new(DecodeConfig {
            parallel: false,
            ..DecodeConfig::default()
        })
        .unwrap();
        assert_eq!(
            parallel.decode(&words).unwrap(),
            sequential.decode(&words).unwrap()
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DecodeConfig {
            nbits: 40,
            ..DecodeConfig::default()
        };
        assert!(matches!(Decoder::new(config), Err(Error::ConfigError(_))));
    }
}
