//! Crate-wide error type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error returned by any operation on the store.
#[derive(Error, Debug)]
pub enum Error {
    /// A key of zero length was passed to a write operation.
    #[error("the key is empty")]
    EmptyKey,

    /// The key was not found in the key directory, or was found but points at a tombstone.
    #[error("key not found")]
    KeyNotFound,

    /// A key directory entry pointed at a segment that is no longer open.
    #[error("data file {0} not found")]
    DataFileNotFound(u64),

    /// A record's stored CRC did not match the CRC recomputed over its bytes.
    #[error("log record corrupted")]
    RecordCorrupted,

    /// The data directory contains a file name that cannot be parsed as a segment id.
    #[error("data file directory may be corrupted: {0}")]
    DirectoryCorrupted(PathBuf),

    /// Another process already holds the exclusive lock on the data directory.
    #[error("database directory is already in use")]
    DirectoryInUse,

    /// A write batch accumulated more pending entries than `BatchOptions::max_batch_num` allows.
    #[error("exceeded the max batch size")]
    BatchTooLarge,

    /// `Engine::merge` was called while a merge was already running.
    #[error("a merge is already in progress")]
    MergeInProgress,

    /// The reclaimable/total byte ratio has not crossed `Options::merge_ratio_threshold`.
    #[error("merge ratio threshold not reached")]
    RatioNotReached,

    /// Not enough free disk space to safely run a merge.
    #[error("not enough disk space available to merge")]
    InsufficientSpace,

    /// An index implementation reported an inconsistency it could not reconcile.
    #[error("failed to update index")]
    IndexUpdateFailed,

    /// The index implementation does not support iteration (the Hash backend).
    #[error("this index does not support iteration")]
    IterationUnsupported,

    /// A supplied configuration value is out of its valid range.
    #[error("invalid option: {0}")]
    InvalidOption(&'static str),

    /// Error from an I/O operation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias matching the signature of every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;
