//! User-facing cursor over live keys, wrapping an index snapshot iterator with a prefix filter.

use bytes::Bytes;

use crate::engine::Engine;
use crate::error::Result;
use crate::index::{IndexIterator, Indexer};
use crate::options::IteratorOptions;

/// A cursor over live keys honoring an optional byte-prefix filter and direction.
///
/// Built from a snapshot of the index at construction time (see `crate::index::SnapshotIterator`
/// and the Hash backend's `Error::IterationUnsupported`), so it does not observe writes made
/// after it was created.
pub struct EngineIterator<'a> {
    engine: &'a Engine,
    inner: Box<dyn IndexIterator>,
    prefix: Vec<u8>,
}

impl<'a> EngineIterator<'a> {
    pub(crate) fn new(engine: &'a Engine, options: IteratorOptions) -> Result<Self> {
        let inner = engine.index.iter(options.reverse)?;
        let mut iter = Self {
            engine,
            inner,
            prefix: options.prefix,
        };
        iter.rewind();
        Ok(iter)
    }

    /// Reset to the first matching entry.
    pub fn rewind(&mut self) {
        self.inner.rewind();
        self.skip_until_prefix_match();
    }

    /// Move to the first matching entry whose key is `>= target` (or `<= target` in reverse).
    pub fn seek(&mut self, target: &[u8]) {
        self.inner.seek(target);
        self.skip_until_prefix_match();
    }

    /// Advance to the next matching entry.
    pub fn next(&mut self) {
        self.inner.next();
        self.skip_until_prefix_match();
    }

    /// Whether the cursor currently sits on a matching entry.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// The key at the cursor. Only meaningful while `valid()`.
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Resolve the value at the cursor by reading it back from its segment.
    pub fn value(&self) -> Result<Bytes> {
        let pos = self.inner.position();
        Ok(self.engine.read_at(pos)?.value)
    }

    fn skip_until_prefix_match(&mut self) {
        if self.prefix.is_empty() {
            return;
        }
        while self.inner.valid() && !self.inner.key().starts_with(self.prefix.as_slice()) {
            self.inner.next();
        }
    }
}
