//! Unordered index backed by a concurrent hash map. Lookups are lock-free per-shard via
//! `dashmap`; iteration is not supported.

use bytes::Bytes;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::index::{IndexIterator, Indexer, Position};

#[derive(Default)]
pub struct HashIndex {
    inner: DashMap<Bytes, Position>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for HashIndex {
    fn put(&self, key: Bytes, pos: Position) -> Result<Option<Position>> {
        Ok(self.inner.insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Option<Position> {
        self.inner.get(key).map(|e| *e)
    }

    fn delete(&self, key: &[u8]) -> (Option<Position>, bool) {
        match self.inner.remove(key) {
            Some((_, pos)) => (Some(pos), true),
            None => (None, false),
        }
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn iter(&self, _reverse: bool) -> Result<Box<dyn IndexIterator>> {
        Err(Error::IterationUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let idx = HashIndex::new();
        idx.put(Bytes::from_static(b"a"), Position::new(1, 0, 10)).unwrap();
        assert_eq!(idx.get(b"a"), Some(Position::new(1, 0, 10)));
        let (_, existed) = idx.delete(b"a");
        assert!(existed);
        assert_eq!(idx.get(b"a"), None);
    }

    #[test]
    fn iteration_is_unsupported() {
        let idx = HashIndex::new();
        assert!(matches!(idx.iter(false), Err(Error::IterationUnsupported)));
    }
}
