//! File-to-timestamps loading.

use crate::reader::{AcquisitionFormat, WordFileReader};
use crate::Result;
use mantapix_core::DecodedFields;
use mantapix_decode::{decode_fields, DecodeConfig, DecodeOutput, Decoder};
use std::path::Path;

/// Options for [`load_timestamps`].
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Front-end that wrote the file.
    pub format: AcquisitionFormat,
    /// First word index to read.
    pub start: usize,
    /// One past the last word index to read.
    pub stop: Option<usize>,
    /// Decoder settings; the flag mode is taken from `format`.
    pub config: DecodeConfig,
    /// Also return the split fields of every word read.
    pub full_output: bool,
}

/// A decoded file.
#[derive(Clone, Debug)]
pub struct LoadedRun {
    /// Per-channel timestamps, flags and counts.
    pub output: DecodeOutput,
    /// Pre-filter fields, present with [`LoadOptions::full_output`].
    pub fields: Option<DecodedFields>,
}

/// Reads a word file and decodes it.
///
/// # Errors
/// Returns an error if the file cannot be read, the decoder config is
/// invalid, or (in debug mode) the words violate the channel range.
pub fn load_timestamps<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<LoadedRun> {
    let decoder = Decoder::new(DecodeConfig {
        fifo_flag_mode: options.format.has_fifo_flags(),
        ..options.config.clone()
    })?;

    let reader = WordFileReader::open(&path)?;
    let source = options.format.source_options(options.start, options.stop);
    let words = reader.read_words(&source)?;

    let fields = decode_fields(&words, decoder.config().nbits);
    drop(words);
    let output = decoder.decode_fields(&fields)?;

    log::info!(
        "{}: {} words, {} timestamps on {} channel(s)",
        path.as_ref().display(),
        output.stats.total_words,
        output.timestamps.total_len(),
        output.stats.active_channels().count()
    );

    Ok(LoadedRun {
        output,
        fields: options.full_output.then_some(fields),
    })
}
