//! Ordered index backed by a radix trie.
//!
//! No adaptive-radix-tree crate is available; `radix_trie` is used instead. It offers the same
//! contract this backend needs (logarithmic-ish keyed lookup, ordered traversal over byte-string
//! keys) and is the closest published, maintained substitute.

use bytes::Bytes;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};

use crate::error::Result;
use crate::index::{IndexIterator, Indexer, Position, SnapshotIterator};

#[derive(Default)]
pub struct ArtIndex {
    inner: RwLock<Trie<Vec<u8>, Position>>,
}

impl ArtIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for ArtIndex {
    fn put(&self, key: Bytes, pos: Position) -> Result<Option<Position>> {
        Ok(self.inner.write().insert(key.to_vec(), pos))
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
        self.inner.read().iter().count()
    }

    fn iter(&self, reverse: bool) -> Result<Box<dyn IndexIterator>> {
        let mut items: Vec<(Bytes, Position)> = self
            .inner
            .read()
            .iter()
            .map(|(k, v)| (Bytes::copy_from_slice(k), *v))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Box::new(SnapshotIterator::new(items, reverse)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let idx = ArtIndex::new();
        idx.put(Bytes::from_static(b"a"), Position::new(1, 0, 10)).unwrap();
        assert_eq!(idx.get(b"a"), Some(Position::new(1, 0, 10)));
        let (_, existed) = idx.delete(b"a");
        assert!(existed);
        assert_eq!(idx.get(b"a"), None);
    }

    #[test]
    fn iterates_in_lexicographic_order() {
        let idx = ArtIndex::new();
        for k in ["banana", "apple", "cherry"] {
            idx.put(Bytes::copy_from_slice(k.as_bytes()), Position::new(1, 0, 1)).unwrap();
        }
        let mut it = idx.iter(false).unwrap();
        it.rewind();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(seen, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);
    }
}
