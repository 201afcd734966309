//! Sentinel removal, FIFO flag extraction and the channel range check.

use mantapix_core::{DecodedFields, Error, FifoFlagColumns, FilteredEvents, Result, NUM_CHANNELS};

/// Detector code reserved as the invalid/sentinel marker.
pub const SENTINEL_DETECTOR: u32 = 0;

/// Bit of the detector code flagging a full big FIFO.
pub const BIG_FIFO_BIT: u32 = 7;

/// Bit of the detector code flagging a full small FIFO.
pub const SMALL_FIFO_BIT: u32 = 6;

/// Mask reducing a flagged detector code to its channel id (`0..64`).
pub const CHANNEL_MASK: u32 = 0x3F;

/// Drops sentinel words and derives channel ids.
///
/// With `fifo_flag_mode` the two FIFO-full bits are split off each
/// detector code and the code is masked down to six bits. Without it the
/// detector code is used as the channel id unchanged. Relative order of the
/// surviving events is preserved.
#[must_use]
pub fn filter_events(fields: &DecodedFields, fifo_flag_mode: bool) -> FilteredEvents {
    let capacity = fields.len();
    let mut timestamp = Vec::with_capacity(capacity);
    let mut channel = Vec::with_capacity(capacity);
    let mut flags = fifo_flag_mode.then(|| FifoFlagColumns::with_capacity(capacity));
    let mut sentinel_count = 0usize;

    for (&ts, &det) in fields.timestamp.iter().zip(&fields.detector) {
        if det == SENTINEL_DETECTOR {
            sentinel_count += 1;
            continue;
        }
        timestamp.push(ts);
        match flags.as_mut() {
            Some(columns) => {
                columns.push(
                    (det >> BIG_FIFO_BIT) & 1 == 1,
                    (det >> SMALL_FIFO_BIT) & 1 == 1,
                );
                channel.push(det & CHANNEL_MASK);
            }
            None => channel.push(det),
        }
    }

    if sentinel_count > 0 {
        // Unreachable with the +1 detector offset and a validated nbits.
        log::warn!("dropped {sentinel_count} sentinel word(s) with detector code 0");
    }

    FilteredEvents {
        timestamp,
        channel,
        flags,
        sentinel_count,
    }
}

/// Outcome of the strict channel range check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCheck {
    /// Every channel id is below 49.
    Valid,
    /// Some events carry channel ids of 49 or more.
    Violation {
        /// Distinct offending ids, ascending.
        offending: Vec<u32>,
        /// Number of offending events.
        count: usize,
    },
}

impl ChannelCheck {
    /// Returns true if no violation was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ChannelCheck::Valid)
    }

    /// Converts a violation into [`Error::FormatViolation`].
    ///
    /// # Errors
    /// Returns the format violation if the check failed.
    pub fn into_result(self) -> Result<()> {
        match self {
            ChannelCheck::Valid => Ok(()),
            ChannelCheck::Violation { offending, count } => {
                Err(Error::FormatViolation { offending, count })
            }
        }
    }
}

/// Verifies that every channel id is `< 49`.
///
/// Channel 0 passes this check; it is excluded later by the
/// demultiplexer.
#[must_use]
pub fn check_channels(channels: &[u32]) -> ChannelCheck {
    let limit = NUM_CHANNELS as u32;
    let mut offending: Vec<u32> = channels.iter().copied().filter(|&c| c > limit).collect();
    if offending.is_empty() {
        return ChannelCheck::Valid;
    }
    let count = offending.len();
    offending.sort_unstable();
    offending.dedup();
    ChannelCheck::Violation { offending, count }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(detector: &[u32]) -> DecodedFields {
        DecodedFields {
            timestamp: (0..detector.len() as u32).map(|i| i * 10).collect(),
            detector: detector.to_vec(),
        }
    }

    #[test]
    fn test_flag_extraction() {
        let events = filter_events(&fields(&[0b1100_0001, 0b0100_0001, 0b1000_0001]), true);
        let flags = events.flags.unwrap();
        assert_eq!(flags.big_fifo_full, vec![true, false, true]);
        // Bit 6 is set in the first code as well
        assert_eq!(flags.small_fifo_full, vec![true, true, false]);
        assert_eq!(events.channel, vec![1, 1, 1]);
    }

    #[test]
    fn test_no_flag_mode_keeps_detector_code() {
        let events = filter_events(&fields(&[0b1100_0001, 5]), false);
        assert!(events.flags.is_none());
        assert_eq!(events.channel, vec![0b1100_0001, 5]);
        assert_eq!(events.timestamp, vec![0, 10]);
    }

    #[test]
    fn test_sentinel_removed_in_order() {
        let events = filter_events(&fields(&[3, 0, 4, 0, 5]), true);
        assert_eq!(events.sentinel_count, 2);
        assert_eq!(events.channel, vec![3, 4, 5]);
        assert_eq!(events.timestamp, vec![0, 20, 40]);
        assert_eq!(events.flags.unwrap().len(), 3);
    }

    #[test]
    fn test_check_channels() {
        assert!(check_channels(&[0, 1, 48]).is_valid());
        assert!(check_channels(&[]).is_valid());

        let check = check_channels(&[1, 60, 49, 60, 2]);
        assert_eq!(
            check,
            ChannelCheck::Violation {
                offending: vec![49, 60],
                count: 3
            }
        );
        let err = check.into_result().unwrap_err();
        assert!(err.is_format_violation());
    }
}
