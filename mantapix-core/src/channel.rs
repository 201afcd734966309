//! Channel ids and the fixed per-channel table.
//!
//! The instrument has 48 detector channels numbered `1..=48`. Per-channel
//! results are kept in a [`ChannelTable`], a fixed array indexed by
//! `channel - 1`. The range check happens once, when a [`ChannelId`] is
//! constructed, never on table access.

use crate::{Error, Result};
use std::fmt;
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of detector channels.
pub const NUM_CHANNELS: usize = 48;

/// A detector channel number in `1..=48`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelId(u8);

impl ChannelId {
    /// First channel.
    pub const FIRST: ChannelId = ChannelId(1);
    /// Last channel.
    pub const LAST: ChannelId = ChannelId(NUM_CHANNELS as u8);

    /// Creates a channel id, returning `None` outside `1..=48`.
    #[inline]
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        if (1..=NUM_CHANNELS as u32).contains(&raw) {
            #[allow(clippy::cast_possible_truncation)]
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    /// Creates a channel id from a zero-based table index.
    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .and_then(|i| Self::new(i.saturating_add(1)))
    }

    /// The channel number (`1..=48`).
    #[inline]
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index into a [`ChannelTable`].
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }

    /// Iterates over all channels in order.
    pub fn all() -> impl Iterator<Item = ChannelId> + Clone {
        (1..=NUM_CHANNELS as u8).map(ChannelId)
    }
}

impl TryFrom<u32> for ChannelId {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self> {
        Self::new(raw).ok_or(Error::InvalidChannel(raw))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.0)
    }
}

/// One value per detector channel, in channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTable<T> {
    slots: [T; NUM_CHANNELS],
}

impl<T> ChannelTable<T> {
    /// Builds a table by calling `f` once per channel, in channel order.
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(ChannelId) -> T,
    {
        Self {
            slots: std::array::from_fn(|i| f(ChannelId((i + 1) as u8))),
        }
    }

    /// Builds a table from exactly [`NUM_CHANNELS`] entries in channel order.
    ///
    /// # Errors
    /// Returns [`Error::ChannelCount`] if `values` has the wrong length.
    pub fn from_vec(values: Vec<T>) -> Result<Self> {
        let found = values.len();
        let slots: [T; NUM_CHANNELS] = values.try_into().map_err(|_| Error::ChannelCount {
            expected: NUM_CHANNELS,
            found,
        })?;
        Ok(Self { slots })
    }

    /// Returns the entry for `channel`.
    #[inline]
    #[must_use]
    pub fn get(&self, channel: ChannelId) -> &T {
        &self.slots[channel.index()]
    }

    /// Returns the entry for `channel` mutably.
    #[inline]
    pub fn get_mut(&mut self, channel: ChannelId) -> &mut T {
        &mut self.slots[channel.index()]
    }

    /// Iterates over `(channel, entry)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &T)> {
        ChannelId::all().zip(self.slots.iter())
    }

    /// Iterates over the entries in channel order.
    pub fn values(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    /// Entries as a slice, channel 1 first.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.slots
    }

    /// Applies `f` to every entry, keeping channel order.
    pub fn map<U, F>(self, f: F) -> ChannelTable<U>
    where
        F: FnMut(T) -> U,
    {
        ChannelTable {
            slots: self.slots.map(f),
        }
    }

    /// Consumes the table, returning entries in channel order.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.slots.into()
    }
}

impl<T: Default> Default for ChannelTable<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<ChannelId> for ChannelTable<T> {
    type Output = T;

    fn index(&self, channel: ChannelId) -> &T {
        self.get(channel)
    }
}

impl<T> IndexMut<ChannelId> for ChannelTable<T> {
    fn index_mut(&mut self, channel: ChannelId) -> &mut T {
        self.get_mut(channel)
    }
}

impl<T> IntoIterator for ChannelTable<T> {
    type Item = T;
    type IntoIter = std::array::IntoIter<T, NUM_CHANNELS>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

impl<T> ChannelTable<Vec<T>> {
    /// Sum of the per-channel lengths.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_range() {
        assert!(ChannelId::new(0).is_none());
        assert_eq!(ChannelId::new(1), Some(ChannelId::FIRST));
        assert_eq!(ChannelId::new(48), Some(ChannelId::LAST));
        assert!(ChannelId::new(49).is_none());
        assert!(ChannelId::new(63).is_none());

        assert!(matches!(
            ChannelId::try_from(49),
            Err(Error::InvalidChannel(49))
        ));
    }

    #[test]
    fn test_channel_index_roundtrip() {
        for ch in ChannelId::all() {
            assert_eq!(ChannelId::from_index(ch.index()), Some(ch));
        }
        assert_eq!(ChannelId::all().count(), NUM_CHANNELS);
        assert!(ChannelId::from_index(NUM_CHANNELS).is_none());
    }

    #[test]
    fn test_table_from_fn_and_index() {
        let table = ChannelTable::from_fn(|ch| u32::from(ch.get()) * 10);
        let ch5 = ChannelId::new(5).unwrap();
        assert_eq!(table[ch5], 50);
        assert_eq!(*table.get(ChannelId::FIRST), 10);
        assert_eq!(table.as_slice().len(), NUM_CHANNELS);

        let order: Vec<u8> = table.iter().map(|(ch, _)| ch.get()).collect();
        assert_eq!(order, (1..=48).collect::<Vec<u8>>());
    }

    #[test]
    fn test_table_from_vec_wrong_length() {
        let err = ChannelTable::from_vec(vec![0u8; 47]).unwrap_err();
        assert_eq!(
            err,
            Error::ChannelCount {
                expected: 48,
                found: 47
            }
        );
        assert!(ChannelTable::from_vec(vec![0u8; 48]).is_ok());
    }

    #[test]
    fn test_table_total_len() {
        let mut table: ChannelTable<Vec<i64>> = ChannelTable::default();
        table[ChannelId::FIRST].extend([1, 2, 3]);
        table[ChannelId::LAST].push(4);
        assert_eq!(table.total_len(), 4);
    }
}
