//! Stable partition of filtered events into per-channel buckets.

use mantapix_core::{ChannelId, ChannelTable, FilteredEvents};

/// Raw per-channel event lists, before rollover unwrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelBuckets {
    /// Wrapping counter values per channel, in source order.
    pub timestamps: ChannelTable<Vec<u32>>,
    /// Big-FIFO-full flags per channel, aligned with `timestamps`.
    pub big_fifo_full: Option<ChannelTable<Vec<bool>>>,
    /// Small-FIFO-full flags per channel, aligned with `timestamps`.
    pub small_fifo_full: Option<ChannelTable<Vec<bool>>>,
    /// Events whose channel id fell outside `1..=48`.
    pub excluded: usize,
}

impl ChannelBuckets {
    /// Number of raw events on `channel`.
    #[must_use]
    pub fn event_count(&self, channel: ChannelId) -> usize {
        self.timestamps[channel].len()
    }

    /// Raw event counts for all channels.
    #[must_use]
    pub fn event_counts(&self) -> ChannelTable<usize> {
        ChannelTable::from_fn(|ch| self.timestamps[ch].len())
    }
}

/// Partitions events into 48 channel buckets in one pass.
///
/// Within each bucket events keep their source order. Events with a
/// channel id outside `1..=48` are counted in
/// [`ChannelBuckets::excluded`] and appear in no bucket.
#[must_use]
pub fn demultiplex(events: &FilteredEvents) -> ChannelBuckets {
    let mut timestamps: ChannelTable<Vec<u32>> = ChannelTable::default();
    let mut big: Option<ChannelTable<Vec<bool>>> =
        events.flags.as_ref().map(|_| ChannelTable::default());
    let mut small: Option<ChannelTable<Vec<bool>>> =
        events.flags.as_ref().map(|_| ChannelTable::default());
    let mut excluded = 0usize;

    for (i, (&ts, &raw_channel)) in events
        .timestamp
        .iter()
        .zip(&events.channel)
        .enumerate()
    {
        let Some(channel) = ChannelId::new(raw_channel) else {
            excluded += 1;
            continue;
        };
        timestamps[channel].push(ts);
        if let (Some(flags), Some(big), Some(small)) =
            (&events.flags, big.as_mut(), small.as_mut())
        {
            big[channel].push(flags.big_fifo_full[i]);
            small[channel].push(flags.small_fifo_full[i]);
        }
    }

    if excluded > 0 {
        log::warn!("excluded {excluded} event(s) with channel id outside 1..=48");
    }

    ChannelBuckets {
        timestamps,
        big_fifo_full: big,
        small_fifo_full: small,
        excluded,
    }
}
