//! Configuration for opening an [`Engine`](crate::engine::Engine) and for the per-call
//! options it accepts.

use std::path::{Path, PathBuf};

use bytesize::ByteSize;

use crate::error::{Error, Result};
use crate::index::IndexType;

/// Options that control how a store is opened.
///
/// Mirrors the fluent-builder style used throughout this codebase: construct a default,
/// override what you need, then pass it to [`Engine::open`](crate::engine::Engine::open).
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) dir_path: PathBuf,
    pub(crate) data_file_size: ByteSize,
    pub(crate) sync_writes: bool,
    pub(crate) sync_per_bytes: u64,
    pub(crate) index_type: IndexType,
    pub(crate) mmap_at_startup: bool,
    pub(crate) merge_ratio_threshold: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./caskdb"),
            data_file_size: ByteSize::mib(32),
            sync_writes: false,
            sync_per_bytes: 0,
            index_type: IndexType::BTree,
            mmap_at_startup: true,
            merge_ratio_threshold: 0.6,
        }
    }
}

impl Options {
    /// Start from the defaults, overriding the data directory.
    pub fn new<P: AsRef<Path>>(dir_path: P) -> Self {
        Self {
            dir_path: dir_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the data directory. Required to be non-empty.
    pub fn dir_path<P: AsRef<Path>>(&mut self, dir_path: P) -> &mut Self {
        self.dir_path = dir_path.as_ref().to_path_buf();
        self
    }

    /// Set the per-segment rollover threshold. Default `32MiB`.
    pub fn data_file_size(&mut self, size: ByteSize) -> &mut Self {
        self.data_file_size = size;
        self
    }

    /// Force an fsync after every write. Default `false`.
    pub fn sync_writes(&mut self, sync: bool) -> &mut Self {
        self.sync_writes = sync;
        self
    }

    /// fsync after this many bytes have been buffered since the last sync, when `sync_writes`
    /// is not set. `0` disables this policy. Default `0`.
    pub fn sync_per_bytes(&mut self, bytes: u64) -> &mut Self {
        self.sync_per_bytes = bytes;
        self
    }

    /// Select the key directory implementation. Default [`IndexType::BTree`].
    pub fn index_type(&mut self, index_type: IndexType) -> &mut Self {
        self.index_type = index_type;
        self
    }

    /// Use memory-mapped I/O to accelerate startup replay. Default `true`.
    pub fn mmap_at_startup(&mut self, enabled: bool) -> &mut Self {
        self.mmap_at_startup = enabled;
        self
    }

    /// Minimum reclaimable/total byte ratio required before `merge()` will run.
    /// Must be in `[0, 1]`. Default `0.6`.
    pub fn merge_ratio_threshold(&mut self, ratio: f64) -> &mut Self {
        self.merge_ratio_threshold = ratio;
        self
    }

    /// Validate the option values, returning `Error::InvalidOption` on the first problem found.
    ///
    /// `data_file_size` has no lower-bound check here: the Go original only rejects a negative
    /// size, and `ByteSize` (backed by `u64`) cannot represent one, so the equivalent check is
    /// vacuous in this port.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(Error::InvalidOption("dir_path must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.merge_ratio_threshold) {
            return Err(Error::InvalidOption(
                "merge_ratio_threshold must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Options controlling a single call to [`Engine::iter`](crate::engine::Engine::iter).
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    pub(crate) prefix: Vec<u8>,
    pub(crate) reverse: bool,
}

impl IteratorOptions {
    /// Only yield keys carrying this byte prefix. Empty prefix matches every key.
    pub fn prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Iterate in descending key order instead of ascending.
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// Options controlling a [`WriteBatch`](crate::batch::WriteBatch).
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub(crate) max_batch_num: usize,
    pub(crate) sync_writes: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_writes: true,
        }
    }
}

impl BatchOptions {
    /// Maximum number of pending entries a batch may accumulate before `commit` fails
    /// with `Error::BatchTooLarge`. Default `10000`.
    pub fn max_batch_num(mut self, max: usize) -> Self {
        self.max_batch_num = max;
        self
    }

    /// fsync the active segment as part of `commit`. Default `true`.
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}
