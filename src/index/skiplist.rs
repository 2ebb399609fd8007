//! Ordered index backed by a lock-free skip list. Reads and writes need no extra locking;
//! `crossbeam_skiplist::SkipMap` is internally concurrent.

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::index::{IndexIterator, Indexer, Position, SnapshotIterator};

/// `SkipMap` has no atomic get-and-swap, so concurrent `put`s on the same key would otherwise
/// race on reading the previous position. `write_lock` serializes only the read-then-insert pair;
/// `get`/`delete` stay lock-free since `SkipMap` already makes each of them atomic on its own.
#[derive(Default)]
pub struct SkipListIndex {
    inner: SkipMap<Bytes, Position>,
    write_lock: Mutex<()>,
}

impl SkipListIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for SkipListIndex {
    fn put(&self, key: Bytes, pos: Position) -> Result<Option<Position>> {
        let _guard = self.write_lock.lock();
        let prev = self.inner.get(&key).map(|e| *e.value());
        self.inner.insert(key, pos);
        Ok(prev)
    }

    fn get(&self, key: &[u8]) -> Option<Position> {
        self.inner.get(key).map(|e| *e.value())
    }

    fn delete(&self, key: &[u8]) -> (Option<Position>, bool) {
        match self.inner.remove(key) {
            Some(e) => (Some(*e.value()), true),
            None => (None, false),
        }
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn iter(&self, reverse: bool) -> Result<Box<dyn IndexIterator>> {
        let items: Vec<(Bytes, Position)> = self
            .inner
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        Ok(Box::new(SnapshotIterator::new(items, reverse)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let idx = SkipListIndex::new();
        idx.put(Bytes::from_static(b"a"), Position::new(1, 0, 10)).unwrap();
        assert_eq!(idx.get(b"a"), Some(Position::new(1, 0, 10)));
        let (_, existed) = idx.delete(b"a");
        assert!(existed);
        assert_eq!(idx.get(b"a"), None);
    }

    #[test]
    fn iterates_in_order() {
        let idx = SkipListIndex::new();
        for k in ["b", "a", "c"] {
            idx.put(Bytes::copy_from_slice(k.as_bytes()), Position::new(1, 0, 1)).unwrap();
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
}
