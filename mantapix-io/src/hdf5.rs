//! HDF5 array-list storage for decoded runs.
//!
//! A decoded run is stored as three append-only lists of 1-D arrays, one
//! entry per channel in channel order:
//!
//! ```text
//! {parent}/timestamps_list/array_0 .. array_47          (i64)
//! {parent}/timestamps_list/big_fifo_full_list/array_*   (bool)
//! {parent}/timestamps_list/small_fifo_full_list/array_* (bool)
//! ```

use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use mantapix_core::{ChannelTable, NUM_CHANNELS};
use mantapix_decode::DecodeOutput;
use ndarray::{s, ArrayView1};
use std::path::Path;
use std::str::FromStr;

/// Group holding the per-channel timestamp arrays.
pub const TIMESTAMPS_GROUP: &str = "timestamps_list";
/// Group holding the per-channel big-FIFO-full arrays.
pub const BIG_FIFO_GROUP: &str = "big_fifo_full_list";
/// Group holding the per-channel small-FIFO-full arrays.
pub const SMALL_FIFO_GROUP: &str = "small_fifo_full_list";

const FORMAT_VERSION_ATTR: &str = "mantapix_format_version";
const FORMAT_VERSION: &str = "0.1";
const DESCR_ATTR: &str = "descr";
const COUNT_ATTR: &str = "count";

/// Options for writing a decoded run.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Truncate and recreate the file instead of appending to it.
    pub overwrite: bool,
    /// Group under which the run's lists are nested.
    pub parent_node: String,
    /// Chunk length of each dataset, in events.
    pub chunk_events: usize,
    /// Deflate level, or `None` for no compression.
    pub compression: Option<u8>,
    /// Apply the shuffle filter before compression.
    pub shuffle: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            parent_node: "/".to_string(),
            chunk_events: 65_536,
            compression: Some(1),
            shuffle: true,
        }
    }
}

impl StoreOptions {
    /// Append to an existing file under `parent_node`.
    #[must_use]
    pub fn append_under(parent_node: &str) -> Self {
        Self {
            overwrite: false,
            parent_node: parent_node.to_string(),
            ..Self::default()
        }
    }
}

/// A named, append-only list of 1-D arrays stored in one HDF5 group.
pub struct ArrayListStore {
    group: Group,
    len: usize,
    chunk_events: usize,
    compression: Option<u8>,
    shuffle: bool,
}

impl ArrayListStore {
    /// Opens the list `name` under `parent`, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn create_or_open(
        parent: &Group,
        name: &str,
        descr: &str,
        options: &StoreOptions,
    ) -> Result<Self> {
        let (group, len) = if parent.link_exists(name) {
            let group = parent.group(name)?;
            let len = read_count(&group)?;
            (group, len)
        } else {
            let group = parent.create_group(name)?;
            set_attr_str_group(&group, DESCR_ATTR, descr)?;
            group
                .new_attr::<u64>()
                .create(COUNT_ATTR)?
                .write_scalar(&0u64)?;
            (group, 0)
        };

        Ok(Self {
            group,
            len,
            chunk_events: options.chunk_events.max(1),
            compression: options.compression,
            shuffle: options.shuffle,
        })
    }

    /// Opens an existing list for reading.
    ///
    /// # Errors
    /// Returns an error if the group is missing or HDF5 I/O fails.
    pub fn open(parent: &Group, name: &str) -> Result<Self> {
        let group = parent.group(name)?;
        let len = read_count(&group)?;
        let defaults = StoreOptions::default();
        Ok(Self {
            group,
            len,
            chunk_events: defaults.chunk_events,
            compression: defaults.compression,
            shuffle: defaults.shuffle,
        })
    }

    /// Number of arrays in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the list holds no arrays.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The underlying HDF5 group.
    #[must_use]
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// The list description, if one was stored.
    ///
    /// # Errors
    /// Returns an error if the attribute cannot be decoded.
    pub fn description(&self) -> Result<Option<String>> {
        read_attr_opt_string(&self.group, DESCR_ATTR)
    }

    /// Appends one array as the next list entry.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn append<T: H5Type>(&mut self, data: &[T]) -> Result<()> {
        let dataset = create_extendable_dataset::<T>(
            &self.group,
            &entry_name(self.len),
            self.chunk_events,
            self.compression,
            self.shuffle,
        )?;
        write_slice(&dataset, data)?;
        self.len += 1;
        self.group.attr(COUNT_ATTR)?.write_scalar(&(self.len as u64))?;
        Ok(())
    }

    /// Reads entry `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range or HDF5 I/O fails.
    pub fn get<T: H5Type>(&self, index: usize) -> Result<Vec<T>> {
        if index >= self.len {
            return Err(Error::InvalidFormat(format!(
                "array list index {index} out of range (len {})",
                self.len
            )));
        }
        read_dataset_vec(&self.group, &entry_name(index))
    }

    /// Reads every entry in list order.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn read_all<T: H5Type>(&self) -> Result<Vec<Vec<T>>> {
        (0..self.len).map(|i| self.get(i)).collect()
    }
}

/// A decoded run read back from a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRun {
    /// Unwrapped timestamps per channel.
    pub timestamps: ChannelTable<Vec<i64>>,
    /// Big-FIFO-full flags, if the run was stored with flags.
    pub big_fifo_full: Option<ChannelTable<Vec<bool>>>,
    /// Small-FIFO-full flags, if the run was stored with flags.
    pub small_fifo_full: Option<ChannelTable<Vec<bool>>>,
}

/// Writes a decoded run and flushes the file before returning.
///
/// Runs appended under one node must all carry FIFO flags or all lack
/// them.
///
/// # Errors
/// Returns an error if HDF5 I/O fails, or [`Error::InvalidFormat`] if the
/// run's flag presence differs from the runs already under the node.
pub fn store_decoded<P: AsRef<Path>>(
    path: P,
    output: &DecodeOutput,
    options: &StoreOptions,
) -> Result<()> {
    let file = if options.overwrite {
        File::create(&path)?
    } else {
        File::append(&path)?
    };
    if !file
        .attr_names()?
        .iter()
        .any(|name| name == FORMAT_VERSION_ATTR)
    {
        set_attr_str_file(&file, FORMAT_VERSION_ATTR, FORMAT_VERSION)?;
    }

    let parent = ensure_group(&file, &options.parent_node)?;
    check_flag_layout(&parent, output.fifo_flags.is_some(), &options.parent_node)?;
    let mut timestamps = ArrayListStore::create_or_open(
        &parent,
        TIMESTAMPS_GROUP,
        &list_descr("timestamps"),
        options,
    )?;
    for values in output.timestamps.values() {
        timestamps.append(values)?;
    }

    if let Some(flags) = &output.fifo_flags {
        let node = timestamps.group();
        let mut big = ArrayListStore::create_or_open(
            node,
            BIG_FIFO_GROUP,
            &list_descr("big-FIFO"),
            options,
        )?;
        let mut small = ArrayListStore::create_or_open(
            node,
            SMALL_FIFO_GROUP,
            &list_descr("small-FIFO"),
            options,
        )?;
        for values in flags.big_fifo_full.values() {
            big.append(values)?;
        }
        for values in flags.small_fifo_full.values() {
            small.append(values)?;
        }
    }

    file.flush()?;
    log::debug!(
        "stored {} timestamps in {} under {}",
        output.timestamps.total_len(),
        path.as_ref().display(),
        options.parent_node
    );
    Ok(())
}

/// Reads every run stored under `parent_node`, oldest first.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or a list length is not a multiple
/// of the channel count.
pub fn load_stored_runs<P: AsRef<Path>>(path: P, parent_node: &str) -> Result<Vec<StoredRun>> {
    let file = File::open(path)?;
    let parent = file.group(parent_node)?;
    let timestamps = ArrayListStore::open(&parent, TIMESTAMPS_GROUP)?;
    let node = timestamps.group();

    let big = open_optional(node, BIG_FIFO_GROUP)?;
    let small = open_optional(node, SMALL_FIFO_GROUP)?;

    let runs = run_count(&timestamps)?;
    let big_arrays = big.map(|s| chunked_tables::<bool>(&s, runs)).transpose()?;
    let small_arrays = small
        .map(|s| chunked_tables::<bool>(&s, runs))
        .transpose()?;

    let mut big_iter = big_arrays.map(Vec::into_iter);
    let mut small_iter = small_arrays.map(Vec::into_iter);

    Ok(chunked_tables::<i64>(&timestamps, runs)?
        .into_iter()
        .map(|timestamps| StoredRun {
            timestamps,
            big_fifo_full: big_iter.as_mut().and_then(Iterator::next),
            small_fifo_full: small_iter.as_mut().and_then(Iterator::next),
        })
        .collect())
}

/// Reads the single run stored under `parent_node`.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the lists do not hold exactly
/// one entry per channel.
pub fn load_stored<P: AsRef<Path>>(path: P, parent_node: &str) -> Result<StoredRun> {
    let mut runs = load_stored_runs(path, parent_node)?;
    if runs.len() != 1 {
        return Err(Error::InvalidFormat(format!(
            "expected one run of {NUM_CHANNELS} arrays under {parent_node}, found {}",
            runs.len()
        )));
    }
    Ok(runs.remove(0))
}

fn check_flag_layout(parent: &Group, has_flags: bool, parent_node: &str) -> Result<()> {
    if !parent.link_exists(TIMESTAMPS_GROUP) {
        return Ok(());
    }
    let timestamps = ArrayListStore::open(parent, TIMESTAMPS_GROUP)?;
    if timestamps.is_empty() {
        return Ok(());
    }
    let node = timestamps.group();
    let stored_flags = node.link_exists(BIG_FIFO_GROUP) && node.link_exists(SMALL_FIFO_GROUP);
    if stored_flags != has_flags {
        return Err(Error::InvalidFormat(format!(
            "runs under {parent_node} {} FIFO flags but the new run {}",
            if stored_flags { "carry" } else { "lack" },
            if has_flags { "has them" } else { "does not" }
        )));
    }
    Ok(())
}

fn run_count(store: &ArrayListStore) -> Result<usize> {
    if store.len() % NUM_CHANNELS != 0 {
        return Err(Error::InvalidFormat(format!(
            "array list holds {} entries, not a multiple of {NUM_CHANNELS}",
            store.len()
        )));
    }
    Ok(store.len() / NUM_CHANNELS)
}

fn chunked_tables<T: H5Type>(
    store: &ArrayListStore,
    runs: usize,
) -> Result<Vec<ChannelTable<Vec<T>>>> {
    if store.len() != runs * NUM_CHANNELS {
        return Err(Error::InvalidFormat(format!(
            "array list holds {} entries, expected {}",
            store.len(),
            runs * NUM_CHANNELS
        )));
    }
    let mut arrays = store.read_all::<T>()?.into_iter();
    (0..runs)
        .map(|_| {
            let run: Vec<Vec<T>> = arrays.by_ref().take(NUM_CHANNELS).collect();
            Ok(ChannelTable::from_vec(run)?)
        })
        .collect()
}

fn open_optional(parent: &Group, name: &str) -> Result<Option<ArrayListStore>> {
    if parent.link_exists(name) {
        Ok(Some(ArrayListStore::open(parent, name)?))
    } else {
        Ok(None)
    }
}

fn ensure_group(file: &File, path: &str) -> Result<Group> {
    let mut group = file.group("/")?;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        group = if group.link_exists(part) {
            group.group(part)?
        } else {
            group.create_group(part)?
        };
    }
    Ok(group)
}

fn list_descr(what: &str) -> String {
    format!("List of arrays of {what} (one per ch).")
}

fn entry_name(index: usize) -> String {
    format!("array_{index}")
}

fn read_count(group: &Group) -> Result<usize> {
    let count: u64 = group.attr(COUNT_ATTR)?.read_scalar()?;
    usize::try_from(count)
        .map_err(|_| Error::InvalidFormat(format!("array list count {count} exceeds usize")))
}

fn create_extendable_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    chunk_events: usize,
    compression: Option<u8>,
    shuffle: bool,
) -> Result<Dataset> {
    let mut builder = group
        .new_dataset::<T>()
        .shape((0..,))
        .chunk((chunk_events,));

    if let Some(level) = compression {
        builder = builder.deflate(level);
    }

    if shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn write_slice<T: H5Type>(dataset: &Dataset, data: &[T]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    dataset.resize((data.len(),))?;
    let view = ArrayView1::from(data);
    dataset.write_slice(view, s![..])?;
    Ok(())
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_group(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_dataset_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_raw::<T>()?)
}

fn read_attr_opt_string(group: &Group, name: &str) -> Result<Option<String>> {
    match group.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}
