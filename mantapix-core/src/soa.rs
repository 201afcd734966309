//! Structure of Arrays (`SoA`) event columns.
//!
//! Each decode stage hands the next one parallel vectors rather than a
//! vector of per-event structs. Every stage produces new owned columns; no
//! column aliases the raw word buffer.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Output of the field decoder: one entry per raw word, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodedFields {
    /// Low `nbits` of each word (the wrapping counter value).
    pub timestamp: Vec<u32>,
    /// High bits of each word plus one (the raw detector code).
    pub detector: Vec<u32>,
}

impl DecodedFields {
    /// Creates empty columns with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamp: Vec::with_capacity(capacity),
            detector: Vec::with_capacity(capacity),
        }
    }

    /// Number of decoded words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    /// Returns true if no words were decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    /// Pushes a single decoded word.
    pub fn push(&mut self, timestamp: u32, detector: u32) {
        self.timestamp.push(timestamp);
        self.detector.push(detector);
    }
}

/// Per-event FIFO-full status bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FifoFlagColumns {
    /// Bit 7 of the raw detector code.
    pub big_fifo_full: Vec<bool>,
    /// Bit 6 of the raw detector code.
    pub small_fifo_full: Vec<bool>,
}

impl FifoFlagColumns {
    /// Creates empty columns with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            big_fifo_full: Vec::with_capacity(capacity),
            small_fifo_full: Vec::with_capacity(capacity),
        }
    }

    /// Number of flagged events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.big_fifo_full.len()
    }

    /// Returns true if there are no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.big_fifo_full.is_empty()
    }

    /// Pushes the flags of one event.
    pub fn push(&mut self, big_fifo_full: bool, small_fifo_full: bool) {
        self.big_fifo_full.push(big_fifo_full);
        self.small_fifo_full.push(small_fifo_full);
    }
}

/// Events that survived sentinel removal, with channel ids derived.
///
/// Channel ids are not range-checked here; ids outside `1..=48` are dealt
/// with by the demultiplexer (lenient) or the channel check (strict).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilteredEvents {
    /// Wrapping counter value per event.
    pub timestamp: Vec<u32>,
    /// Channel id per event (masked to 6 bits when flags are extracted).
    pub channel: Vec<u32>,
    /// FIFO flags, present only when flag extraction was enabled.
    pub flags: Option<FifoFlagColumns>,
    /// Number of sentinel words dropped.
    pub sentinel_count: usize,
}

impl FilteredEvents {
    /// Number of surviving events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    /// Returns true if no events survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }
}
