//! Memory-mapped word sources.
//!

use crate::{Error, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const WORD_SIZE: usize = 4;

// Below this many words the rayon split costs more than it saves.
const PARALLEL_MIN_WORDS: usize = 1 << 16;

/// A memory-mapped file reader.
///
/// Uses memmap2 to efficiently access file contents without
/// loading the entire file into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Byte order of the 32-bit words on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ByteOrder {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    #[default]
    Little,
}

impl ByteOrder {
    #[inline]
    fn word(self, bytes: [u8; WORD_SIZE]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }
}

/// How to turn a file into a word buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WordSourceOptions {
    /// Byte order of the words.
    pub byte_order: ByteOrder,
    /// Number of `\n`-terminated header lines before the first word.
    pub skip_lines: usize,
    /// First word index to read (relative to the end of the header).
    pub start: usize,
    /// One past the last word index to read; `None` reads to the end.
    pub stop: Option<usize>,
}

impl WordSourceOptions {
    /// Restricts reading to the word window `[start, stop)`.
    #[must_use]
    pub fn with_window(mut self, start: usize, stop: Option<usize>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }
}

/// Acquisition front-ends producing timestamp word files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AcquisitionFormat {
    /// Unmodified little-endian words, no header.
    Raw,
    /// Big-endian words after a three-line text header.
    #[default]
    Xa,
    /// NI card: big-endian, three-line header, no FIFO status bits.
    Ni,
}

impl AcquisitionFormat {
    /// Number of header lines written by the Xa and NI front-ends.
    pub const HEADER_LINES: usize = 3;

    /// Word source settings for this format.
    ///
    /// The window is honoured only by [`AcquisitionFormat::Xa`]; the other
    /// formats are always read whole.
    #[must_use]
    pub fn source_options(self, start: usize, stop: Option<usize>) -> WordSourceOptions {
        match self {
            AcquisitionFormat::Raw => WordSourceOptions {
                byte_order: ByteOrder::Little,
                ..WordSourceOptions::default()
            },
            AcquisitionFormat::Xa => WordSourceOptions {
                byte_order: ByteOrder::Big,
                skip_lines: Self::HEADER_LINES,
                start,
                stop,
            },
            AcquisitionFormat::Ni => WordSourceOptions {
                byte_order: ByteOrder::Big,
                skip_lines: Self::HEADER_LINES,
                ..WordSourceOptions::default()
            },
        }
    }

    /// Whether words of this format carry FIFO-full bits.
    #[must_use]
    pub fn has_fifo_flags(self) -> bool {
        !matches!(self, AcquisitionFormat::Ni)
    }
}

/// Byte offset just past the first `lines` newline-terminated lines.
///
/// A header that runs out before its final newline consumes all of `data`.
#[must_use]
pub fn skip_header_lines(data: &[u8], lines: usize) -> usize {
    let mut offset = 0;
    for _ in 0..lines {
        match data[offset..].iter().position(|&b| b == b'\n') {
            Some(pos) => offset += pos + 1,
            None => return data.len(),
        }
    }
    offset
}

/// Converts whole 4-byte words, ignoring a trailing partial word.
#[must_use]
pub fn words_from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Vec<u32> {
    let convert = |chunk: &[u8]| {
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(chunk);
        byte_order.word(word)
    };
    if bytes.len() / WORD_SIZE >= PARALLEL_MIN_WORDS {
        bytes.par_chunks_exact(WORD_SIZE).map(convert).collect()
    } else {
        bytes.chunks_exact(WORD_SIZE).map(convert).collect()
    }
}

/// A timestamp word file with memory-mapped I/O.
pub struct WordFileReader {
    reader: MappedFileReader,
}

impl WordFileReader {
    /// Opens a word file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Byte range of the requested word window.
    fn body_range(&self, options: &WordSourceOptions) -> Result<std::ops::Range<usize>> {
        let data = self.reader.as_bytes();
        let header = skip_header_lines(data, options.skip_lines);
        let body_len = data.len() - header;

        if body_len % WORD_SIZE != 0 {
            return Err(Error::InvalidFormat(format!(
                "{body_len} bytes after a {}-line header is not a multiple of {WORD_SIZE} (file: {})",
                options.skip_lines,
                self.reader.path().display()
            )));
        }

        let total = body_len / WORD_SIZE;
        let stop = options.stop.map_or(total, |stop| stop.min(total));
        if options.start > stop {
            return Err(Error::InvalidFormat(format!(
                "word window start {} is past stop {stop} ({total} words in file: {})",
                options.start,
                self.reader.path().display()
            )));
        }

        Ok(header + options.start * WORD_SIZE..header + stop * WORD_SIZE)
    }

    /// Number of words the options select.
    ///
    /// # Errors
    /// Returns an error if the body is not a whole number of words or the
    /// window is inverted.
    pub fn word_count(&self, options: &WordSourceOptions) -> Result<usize> {
        Ok(self.body_range(options)?.len() / WORD_SIZE)
    }

    /// Reads the selected words in on-disk order.
    ///
    /// # Errors
    /// Returns an error if the body is not a whole number of words or the
    /// window is inverted.
    pub fn read_words(&self, options: &WordSourceOptions) -> Result<Vec<u32>> {
        let range = self.body_range(options)?;
        let words = words_from_bytes(&self.reader.as_bytes()[range], options.byte_order);
        log::debug!(
            "read {} words from {} ({:?}, {} header lines, start {})",
            words.len(),
            self.reader.path().display(),
            options.byte_order,
            options.skip_lines,
            options.start
        );
        Ok(words)
    }
}
