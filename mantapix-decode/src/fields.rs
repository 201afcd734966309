//! Raw word layout and field extraction.
//!
//! A raw word carries the wrapping counter value in its low `nbits` bits
//! and the detector code in the remaining high bits. The decoded detector
//! code is offset by one so that zero stays free as the sentinel value.

use crate::MAX_NBITS;
use mantapix_core::DecodedFields;

/// Default width of the onboard counter in bits.
pub const DEFAULT_NBITS: u32 = 24;

/// Mask selecting the counter bits of a word.
///
/// # Panics
/// Panics if `nbits` is outside `1..=31`. The decoder config rejects such
/// values before any word is decoded.
#[inline]
#[must_use]
pub const fn counter_mask(nbits: u32) -> u32 {
    assert!(nbits >= 1 && nbits <= MAX_NBITS, "nbits must be in 1..=31");
    (1u32 << nbits) - 1
}

/// Counter modulus `2^nbits` as a 64-bit value.
#[inline]
#[must_use]
pub const fn counter_modulus(nbits: u32) -> i64 {
    1i64 << nbits
}

/// Splits a raw word into `(timestamp, detector_raw)`.
///
/// # Panics
/// Panics if `nbits` is outside `1..=31`.
#[inline]
#[must_use]
pub fn decode_word(word: u32, nbits: u32) -> (u32, u32) {
    let timestamp = word & counter_mask(nbits);
    let detector = (word >> nbits).wrapping_add(1);
    (timestamp, detector)
}

/// Rebuilds a raw word from its decoded fields.
///
/// Inverse of [`decode_word`] for any `detector_raw >= 1`.
///
/// # Panics
/// Panics if `nbits` is outside `1..=31`.
#[inline]
#[must_use]
pub fn encode_word(timestamp: u32, detector_raw: u32, nbits: u32) -> u32 {
    let mask = counter_mask(nbits);
    (detector_raw.wrapping_sub(1) << nbits) | (timestamp & mask)
}

/// Decodes a whole word buffer into parallel columns, preserving order.
///
/// # Panics
/// Panics if `nbits` is outside `1..=31`.
#[must_use]
pub fn decode_fields(words: &[u32], nbits: u32) -> DecodedFields {
    let mask = counter_mask(nbits);
    DecodedFields {
        timestamp: words.iter().map(|&w| w & mask).collect(),
        detector: words.iter().map(|&w| (w >> nbits).wrapping_add(1)).collect(),
    }
}
