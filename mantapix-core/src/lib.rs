//! mantapix-core: Core types for single-photon timestamp decoding.
//!
//! This crate provides the channel numbering, the fixed 48-slot
//! per-channel table and the columnar event buffers shared by the
//! decoder and the I/O layer.
//!

pub mod channel;
pub mod error;
pub mod soa;

pub use channel::{ChannelId, ChannelTable, NUM_CHANNELS};
pub use error::{Error, Result};
pub use soa::{DecodedFields, FifoFlagColumns, FilteredEvents};
