//! Ordered index backed by a `BTreeMap` behind a single `RwLock`. The default backend.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::Result;
use crate::index::{IndexIterator, Indexer, Position, SnapshotIterator};

#[derive(Default)]
pub struct BTreeIndex {
    inner: RwLock<BTreeMap<Bytes, Position>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Bytes, pos: Position) -> Result<Option<Position>> {
        Ok(self.inner.write().insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Option<Position> {
        self.inner.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> (Option<Position>, bool) {
        match self.inner.write().remove(key) {
            Some(pos) => (Some(pos), true),
            None => (None, false),
        }
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }

    fn iter(&self, reverse: bool) -> Result<Box<dyn IndexIterator>> {
        let items: Vec<(Bytes, Position)> = self
            .inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Ok(Box::new(SnapshotIterator::new(items, reverse)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let idx = BTreeIndex::new();
        idx.put(Bytes::from_static(b"a"), Position::new(1, 0, 10)).unwrap();
        assert_eq!(idx.get(b"a"), Some(Position::new(1, 0, 10)));
        let (prev, existed) = idx.delete(b"a");
        assert!(existed);
        assert_eq!(prev, Some(Position::new(1, 0, 10)));
        assert_eq!(idx.get(b"a"), None);
    }

    #[test]
    fn iterates_in_order() {
        let idx = BTreeIndex::new();
        for (k, fid) in [("b", 2), ("a", 1), ("c", 3)] {
            idx.put(Bytes::copy_from_slice(k.as_bytes()), Position::new(fid, 0, 1)).unwrap();
        }
        let mut it = idx.iter(false).unwrap();
        it.rewind();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn seek_forward_finds_first_geq() {
        let idx = BTreeIndex::new();
        for k in ["a", "c", "e"] {
            idx.put(Bytes::copy_from_slice(k.as_bytes()), Position::new(1, 0, 1)).unwrap();
        }
        let mut it = idx.iter(false).unwrap();
        it.seek(b"b");
        assert_eq!(it.key(), b"c");
    }
}
