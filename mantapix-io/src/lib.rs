//! mantapix-io: Word sources and storage for mantapix.
//!
//! This crate reads timestamp word files through memory-mapped I/O
//! (via memmap2) and, with the `hdf5` feature, persists decoded runs as
//! HDF5 array lists.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod load;
mod reader;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use crate::hdf5::{
    load_stored, load_stored_runs, store_decoded, ArrayListStore, StoreOptions, StoredRun,
};
pub use load::{load_timestamps, LoadOptions, LoadedRun};
pub use reader::{
    skip_header_lines, words_from_bytes, AcquisitionFormat, ByteOrder, MappedFileReader,
    WordFileReader, WordSourceOptions,
};
