//! An embeddable, persistent, ordered key/value store based on the Bitcask log-structured
//! storage model.
//!
//! Every mutation is appended to a log on disk; an in-memory key directory maps each key to the
//! location of its most recent value so point lookups cost a single disk seek. The store is
//! synchronous: every operation runs to completion on the calling thread. See
//! [`Engine`] for the public contract.

pub mod batch;
mod codec;
pub mod engine;
pub mod error;
pub mod index;
mod io;
pub mod iterator;
mod lock;
mod merge;
pub mod options;
mod segment;
mod util;

pub use batch::WriteBatch;
pub use engine::{Engine, Stat};
pub use error::{Error, Result};
pub use index::IndexType;
pub use iterator::EngineIterator;
pub use options::{BatchOptions, IteratorOptions, Options};
