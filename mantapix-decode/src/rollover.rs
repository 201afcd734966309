//! Counter rollover correction.
//!
//! The onboard counter is `nbits` wide and wraps from `2^nbits - 1` back to
//! zero. Within a channel the counter only moves forward, so a drop larger
//! than the jitter tolerance marks a wrap. Each wrap adds one modulus to
//! every later timestamp of that channel.

use crate::fields::counter_modulus;

/// Default jitter tolerance for rollover detection.
pub const DEFAULT_DELTA_ROLLOVER: u32 = 1;

/// Minimum raw events a channel needs to produce any output.
///
/// The first event only serves as the reference for the first difference.
pub const MIN_CHANNEL_EVENTS: usize = 3;

/// Returns true if the step `previous -> current` is a counter wrap.
///
/// Drops of at most `delta_rollover` are treated as jitter.
#[inline]
#[must_use]
pub fn is_rollover(previous: u32, current: u32, delta_rollover: u32) -> bool {
    i64::from(current) - i64::from(previous) < -i64::from(delta_rollover)
}

/// Unwraps one channel's counter values into 64-bit timestamps.
///
/// Output is aligned with `times32[1..]`: `times32[0]` is consumed as the
/// reference and never emitted. Channels with fewer than
/// [`MIN_CHANNEL_EVENTS`] values yield an empty vector.
///
/// Formula: `out[i] = wraps(0..=i) * 2^nbits + times32[i + 1]`
#[must_use]
pub fn unwrap_rollover(times32: &[u32], nbits: u32, delta_rollover: u32) -> Vec<i64> {
    if times32.len() < MIN_CHANNEL_EVENTS {
        return Vec::new();
    }

    let modulus = counter_modulus(nbits);
    let mut offset = 0i64;

    times32
        .windows(2)
        .map(|pair| {
            if is_rollover(pair[0], pair[1], delta_rollover) {
                offset += modulus;
            }
            offset + i64::from(pair[1])
        })
        .collect()
}

/// Number of wraps [`unwrap_rollover`] applies to a channel.
///
/// Zero for channels below [`MIN_CHANNEL_EVENTS`].
#[must_use]
pub fn count_rollovers(times32: &[u32], delta_rollover: u32) -> usize {
    if times32.len() < MIN_CHANNEL_EVENTS {
        return 0;
    }
    times32
        .windows(2)
        .filter(|pair| is_rollover(pair[0], pair[1], delta_rollover))
        .count()
}
