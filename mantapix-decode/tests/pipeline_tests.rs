#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal
)]
use mantapix_decode::{
    check_channels, decode_fields, decode_with_flags, decode_without_flags, demultiplex,
    encode_word, filter_events, ChannelId, DecodeConfig, Decoder, NUM_CHANNELS,
};

const NBITS: u32 = 24;
const MODULUS: u32 = 1 << NBITS;

// Word for a channel with both FIFO bits clear
fn make_word(channel: u32, counter: u32) -> u32 {
    encode_word(counter, channel, NBITS)
}

// Word carrying FIFO-full bits on top of the channel id
fn make_flagged_word(channel: u32, counter: u32, big: bool, small: bool) -> u32 {
    let detector = channel | (u32::from(big) << 7) | (u32::from(small) << 6);
    encode_word(counter, detector, NBITS)
}

// Small deterministic generator so the fixtures need no extra crates
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }
}

// Interleaves per-channel counters that advance by random steps and wrap
// at 2^NBITS, returning the words and the expected true time per word.
fn make_stream(len: usize, seed: u64) -> (Vec<u32>, Vec<(u32, i64)>) {
    let mut rng = Lcg(seed);
    let mut clocks = [0i64; NUM_CHANNELS];
    let mut words = Vec::with_capacity(len);
    let mut truth = Vec::with_capacity(len);
    for _ in 0..len {
        let channel = 1 + rng.next() % NUM_CHANNELS as u32;
        let step = i64::from(2 + rng.next() % 3_000_000);
        let clock = &mut clocks[(channel - 1) as usize];
        *clock += step;
        let counter = (*clock % i64::from(MODULUS)) as u32;
        words.push(make_word(channel, counter));
        truth.push((channel, *clock));
    }
    (words, truth)
}

#[test]
fn test_field_roundtrip() {
    let mut rng = Lcg(7);
    for _ in 0..10_000 {
        let w = rng.next() ^ (rng.next() << 16);
        let fields = decode_fields(&[w], NBITS);
        assert_eq!(encode_word(fields.timestamp[0], fields.detector[0], NBITS), w);
    }
}

#[test]
fn test_unwrap_example() {
    let words: Vec<u32> = [16777200, 16777210, 5, 20]
        .iter()
        .map(|&t| make_word(1, t))
        .collect();
    let out = decode_with_flags(&words, &DecodeConfig::default()).unwrap();
    assert_eq!(
        out.channel(ChannelId::FIRST),
        &[16777210, 16777221, 16777236]
    );
}

#[test]
fn test_flag_alignment() {
    let words = [
        make_flagged_word(1, 100, true, true),
        make_flagged_word(1, 200, false, true),
        make_flagged_word(1, 300, true, false),
    ];
    let out = decode_with_flags(&words, &DecodeConfig::default()).unwrap();
    let flags = out.fifo_flags.unwrap();

    // Raw detector codes after the +1 offset
    let fields = decode_fields(&words, NBITS);
    assert_eq!(fields.detector, vec![0b1100_0001, 0b0100_0001, 0b1000_0001]);

    assert_eq!(flags.big_fifo_full[ChannelId::FIRST], vec![true, false, true]);
    assert_eq!(
        flags.small_fifo_full[ChannelId::FIRST],
        vec![true, true, false]
    );

    // Flags keep the full raw length; timestamps drop the reference event
    assert_eq!(out.timestamps[ChannelId::FIRST], vec![200, 300]);
}

#[test]
fn test_flags_are_not_offset() {
    // Two events: timestamps empty, flags still reported
    let words = [
        make_flagged_word(9, 1, true, false),
        make_flagged_word(9, 2, false, false),
    ];
    let out = decode_with_flags(&words, &DecodeConfig::default()).unwrap();
    let ch9 = ChannelId::new(9).unwrap();
    assert!(out.timestamps[ch9].is_empty());
    let flags = out.fifo_flags.unwrap();
    assert_eq!(flags.big_fifo_full[ch9], vec![true, false]);
    assert_eq!(flags.small_fifo_full[ch9], vec![false, false]);
}

#[test]
fn test_minimum_data_policy() {
    let mut words = Vec::new();
    // Channel 1: 0 events, channel 2: 1, channel 3: 2, channel 4: 3
    words.push(make_word(2, 10));
    words.extend([make_word(3, 10), make_word(3, 20)]);
    words.extend([make_word(4, 10), make_word(4, 20), make_word(4, 30)]);

    let out = decode_without_flags(&words, &DecodeConfig::default()).unwrap();
    for n in 1..=3 {
        assert!(out.timestamps[ChannelId::new(n).unwrap()].is_empty());
    }
    assert_eq!(out.timestamps[ChannelId::new(4).unwrap()], vec![20, 30]);
}

#[test]
fn test_stream_recovers_true_time() {
    let (words, truth) = make_stream(50_000, 42);
    let out = decode_with_flags(&words, &DecodeConfig::default()).unwrap();

    for ch in ChannelId::all() {
        let expected: Vec<i64> = truth
            .iter()
            .filter(|(c, _)| *c == u32::from(ch.get()))
            .map(|&(_, t)| t)
            .collect();
        let got = out.channel(ch);
        if expected.len() < 3 {
            assert!(got.is_empty());
            continue;
        }

        // Unwrapped values match the true clock up to the epoch of the
        // reference event, and keep source order.
        let base = expected[0] - expected[0] % i64::from(MODULUS);
        let shifted: Vec<i64> = expected[1..].iter().map(|t| t - base).collect();
        assert_eq!(got, shifted.as_slice(), "channel {ch}");
        assert!(got.windows(2).all(|w| w[0] <= w[1]), "channel {ch}");
    }
}

#[test]
fn test_partition_completeness() {
    let (mut words, _) = make_stream(20_000, 3);
    // Add words that land outside 1..=48: channel 0 and 63 after masking
    words.push(make_word(64, 5));
    words.push(make_word(63, 5));

    let fields = decode_fields(&words, NBITS);
    let events = filter_events(&fields, true);
    let buckets = demultiplex(&events);

    let bucketed: usize = buckets.event_counts().values().sum();
    assert_eq!(bucketed + buckets.excluded + events.sentinel_count, words.len());
    assert_eq!(buckets.excluded, 2);

    let out = Decoder::new(DecodeConfig::default())
        .unwrap()
        .decode(&words)
        .unwrap();
    assert_eq!(out.stats.total_words, words.len());
    assert_eq!(out.stats.accounted_words(), words.len());
}

#[test]
fn test_sentinel_filter_never_triggers() {
    // With the +1 detector offset no word decodes to detector code 0.
    let words = [0u32, 0x00FF_FFFF, 0xFF00_0000, u32::MAX];
    for nbits in [1, 8, 24, 31] {
        let fields = decode_fields(&words, nbits);
        assert!(fields.detector.iter().all(|&d| d != 0));
        let events = filter_events(&fields, false);
        assert_eq!(events.sentinel_count, 0);
    }
}

#[test]
fn test_strict_mode_distinguishes_format_errors() {
    // nbits=24 data decoded as nbits=16 puts counter bits into the channel
    let words: Vec<u32> = (0..10).map(|i| make_word(5, 0x00AB_0000 + i)).collect();
    let config = DecodeConfig {
        nbits: 16,
        fifo_flag_mode: false,
        debug: true,
        ..DecodeConfig::default()
    };
    let err = Decoder::new(config).unwrap().decode(&words).unwrap_err();
    assert!(err.is_format_violation());

    let fields = decode_fields(&words, 16);
    assert!(!check_channels(&fields.detector).is_valid());
}

#[test]
fn test_channel_zero_dropped_even_in_debug_mode() {
    // Detector code 64 masks to channel 0: below 49, so no violation
    let words = [
        make_word(64, 1),
        make_word(1, 1),
        make_word(1, 2),
        make_word(1, 3),
    ];
    let config = DecodeConfig::default().with_debug(true);
    let out = decode_with_flags(&words, &config).unwrap();
    assert_eq!(out.stats.excluded_words, 1);
    assert_eq!(out.timestamps.total_len(), 2);
}
