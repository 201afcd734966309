//! mantapix command-line interface.
//!
//! Decodes timestamp word files, prints per-channel summaries and writes
//! or inspects HDF5 array-list stores.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};
use mantapix_core::ChannelId;
use mantapix_decode::{DecodeConfig, DecodeOutput};
use mantapix_io::{
    load_stored_runs, load_timestamps, store_decoded, AcquisitionFormat, LoadOptions,
    StoreOptions, StoredRun, WordFileReader,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    MantapixIo(#[from] mantapix_io::Error),

    #[error("{0}")]
    Core(#[from] mantapix_core::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CliError {
    fn is_format_violation(&self) -> bool {
        match self {
            CliError::MantapixIo(e) => e.is_format_violation(),
            CliError::Core(e) => e.is_format_violation(),
            _ => false,
        }
    }
}

/// Acquisition front-end selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Little-endian words without header
    Raw,
    /// Xa front-end: big-endian, 3-line header, FIFO bits
    Xa,
    /// NI card: big-endian, 3-line header, no FIFO bits
    Ni,
}

impl From<Format> for AcquisitionFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Raw => AcquisitionFormat::Raw,
            Format::Xa => AcquisitionFormat::Xa,
            Format::Ni => AcquisitionFormat::Ni,
        }
    }
}

/// Multi-channel single-photon timestamp decoder.
#[derive(Parser)]
#[command(name = "mantapix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a timestamp file into per-channel timestamps
    Decode {
        /// Input word file
        input: PathBuf,

        /// Acquisition front-end that wrote the file
        #[arg(short, long, value_enum, default_value = "xa")]
        format: Format,

        /// First word to decode (xa only)
        #[arg(long, default_value = "0")]
        start: usize,

        /// One past the last word to decode (xa only)
        #[arg(long)]
        stop: Option<usize>,

        /// JSON decoder configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Counter width in bits
        #[arg(long)]
        nbits: Option<u32>,

        /// Largest counter drop treated as jitter
        #[arg(long)]
        delta_rollover: Option<u32>,

        /// Fail on channel ids of 49 or more
        #[arg(long)]
        debug: bool,

        /// Unwrap channels on one thread
        #[arg(long)]
        serial: bool,

        /// Write the result to an HDF5 file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append to an existing HDF5 file instead of replacing it
        #[arg(long, requires = "output")]
        append: bool,

        /// Group that receives the array lists
        #[arg(long, default_value = "/")]
        parent_node: String,
    },

    /// Show information about a timestamp file
    Info {
        /// Input word file
        input: PathBuf,

        /// Acquisition front-end that wrote the file
        #[arg(short, long, value_enum, default_value = "xa")]
        format: Format,

        /// Counter width in bits
        #[arg(long)]
        nbits: Option<u32>,
    },

    /// Summarise the runs stored in an HDF5 file
    Show {
        /// HDF5 store
        input: PathBuf,

        /// Group holding the array lists
        #[arg(long, default_value = "/")]
        parent_node: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::builder();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        if e.is_format_violation() {
            eprintln!("Hint: the words do not match the expected layout; check --nbits and --format.");
        }
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Decode {
            input,
            format,
            start,
            stop,
            config,
            nbits,
            delta_rollover,
            debug,
            serial,
            output,
            append,
            parent_node,
        } => {
            let mut decode_config = match config {
                Some(path) => DecodeConfig::from_file(&path)
                    .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?,
                None => DecodeConfig::default(),
            };
            if let Some(nbits) = nbits {
                decode_config.nbits = nbits;
            }
            if let Some(delta) = delta_rollover {
                decode_config.delta_rollover = delta;
            }
            decode_config.debug |= debug;
            decode_config.parallel &= !serial;

            let options = LoadOptions {
                format: format.into(),
                start,
                stop,
                config: decode_config,
                full_output: false,
            };

            log::debug!("decoding {} with {:?}", input.display(), options);
            let begin = Instant::now();
            let loaded = load_timestamps(&input, &options)?;
            let elapsed = begin.elapsed();

            print_decode_summary(&input, &loaded.output);
            println!("Decoded in {:.2}s", elapsed.as_secs_f64());

            if let Some(path) = output {
                let store_options = StoreOptions {
                    overwrite: !append,
                    parent_node,
                    ..StoreOptions::default()
                };
                store_decoded(&path, &loaded.output, &store_options)?;
                println!(
                    "Wrote {} under {}",
                    path.display(),
                    store_options.parent_node
                );
            }
        }

        Commands::Info {
            input,
            format,
            nbits,
        } => {
            let info = file_info(&input, format.into(), nbits)?;

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                info.file_size,
                info.file_size as f64 / 1_000_000.0
            );
            println!("Format: {:?}", info.format);
            println!("FIFO flags: {}", if info.format.has_fifo_flags() { "yes" } else { "no" });
            println!("Words: {}", info.words);
            println!("Sentinel words: {}", info.sentinel_words);
            println!("Excluded words: {}", info.excluded_words);
            println!("Active channels: {}", info.active_channels);
        }

        Commands::Show { input, parent_node } => {
            let runs = load_stored_runs(&input, &parent_node)?;
            println!("File: {}", input.display());
            println!("Runs under {}: {}", parent_node, runs.len());
            for (i, run) in runs.iter().enumerate() {
                println!();
                println!("Run {i}");
                print_stored_run(run);
            }
        }
    }

    Ok(())
}

/// Word totals of a timestamp file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileInfo {
    format: AcquisitionFormat,
    file_size: usize,
    words: usize,
    sentinel_words: usize,
    excluded_words: usize,
    active_channels: usize,
}

fn file_info(input: &Path, format: AcquisitionFormat, nbits: Option<u32>) -> Result<FileInfo> {
    let reader = WordFileReader::open(input)?;
    let file_size = reader.file_size();

    let mut config = DecodeConfig::default();
    if let Some(nbits) = nbits {
        config.nbits = nbits;
    }
    let options = LoadOptions {
        format,
        config,
        ..LoadOptions::default()
    };
    let stats = load_timestamps(input, &options)?.output.stats;

    Ok(FileInfo {
        format,
        file_size,
        words: stats.total_words,
        sentinel_words: stats.sentinel_words,
        excluded_words: stats.excluded_words,
        active_channels: stats.active_channels().count(),
    })
}

fn print_decode_summary(input: &Path, output: &DecodeOutput) {
    let stats = &output.stats;
    println!("File: {}", input.display());
    println!(
        "Words: {} ({} sentinel, {} excluded)",
        stats.total_words, stats.sentinel_words, stats.excluded_words
    );
    println!(
        "{:<6} | {:>10} | {:>10} | {:>9} | {:>9} | {:>9}",
        "Chan", "Events", "Timestamps", "Rollovers", "Big FIFO", "Small FIFO"
    );
    println!("{:-<68}", "");

    for ch in stats.active_channels() {
        let (big, small) = match &output.fifo_flags {
            Some(flags) => (
                count_set(&flags.big_fifo_full[ch]).to_string(),
                count_set(&flags.small_fifo_full[ch]).to_string(),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<6} | {:>10} | {:>10} | {:>9} | {:>9} | {:>9}",
            ch.to_string(),
            stats.events[ch],
            output.timestamps[ch].len(),
            stats.rollovers[ch],
            big,
            small
        );
    }
}

fn print_stored_run(run: &StoredRun) {
    println!(
        "{:<6} | {:>10} | {:>20} | {:>20}",
        "Chan", "Timestamps", "First", "Last"
    );
    println!("{:-<66}", "");

    for ch in ChannelId::all() {
        let times = &run.timestamps[ch];
        if let (Some(first), Some(last)) = (times.first(), times.last()) {
            println!(
                "{:<6} | {:>10} | {:>20} | {:>20}",
                ch.to_string(),
                times.len(),
                first,
                last
            );
        }
    }

    if let Some(big) = &run.big_fifo_full {
        let set: usize = big.values().map(|v| count_set(v)).sum();
        println!("Big FIFO full events: {set}");
    }
    if let Some(small) = &run.small_fifo_full {
        let set: usize = small.values().map(|v| count_set(v)).sum();
        println!("Small FIFO full events: {set}");
    }
}

fn count_set(flags: &[bool]) -> usize {
    flags.iter().filter(|&&f| f).count()
}
