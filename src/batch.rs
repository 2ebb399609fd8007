//! Atomic multi-key writes. A batch stages puts and deletes privately, then commits them all
//! under a single sequence number and a terminating commit sentinel.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::codec::{encode_key_with_seq, LogRecord, RecordType, TXN_FIN_KEY};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::index::Indexer;
use crate::options::BatchOptions;

#[derive(Clone)]
enum PendingOp {
    Put(Bytes),
    Delete,
}

/// A staged, atomic, multi-key write. Nothing is visible to readers until `commit` succeeds.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: BatchOptions,
    pending: Mutex<HashMap<Bytes, PendingOp>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(engine: &'a Engine, options: BatchOptions) -> Self {
        Self {
            engine,
            options,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Stage a put. Last write for a given key within the batch wins.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.pending.lock().insert(key, PendingOp::Put(value.into()));
        Ok(())
    }

    /// Stage a delete. If the key has no pending put/delete and is absent from the index, this
    /// is a no-op; if it only exists as a pending write within this batch, that pending write
    /// is simply dropped.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let mut pending = self.pending.lock();
        if pending.remove(key).is_some() {
            return Ok(());
        }
        if self.engine.index.get(key).is_none() {
            return Ok(());
        }
        pending.insert(Bytes::copy_from_slice(key), PendingOp::Delete);
        Ok(())
    }

    /// Commit every staged write atomically. Readers observe either all of the batch's writes
    /// or none of them, even across a crash.
    pub fn commit(&self) -> Result<()> {
        let _serialize = self.engine.batch_commit_lock.lock();
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(Error::BatchTooLarge);
        }

        let seq = self.engine.next_seq();

        let mut state = self.engine.state.write();
        let mut applied = Vec::with_capacity(pending.len());
        for (key, op) in pending {
            let (value, record_type) = match op {
                PendingOp::Put(v) => (v, RecordType::Normal),
                PendingOp::Delete => (Bytes::new(), RecordType::Tombstone),
            };
            let record = LogRecord::new(encode_key_with_seq(&key, seq), value, record_type);
            let pos = self.engine.append_record_locked(&mut state, &record)?;
            applied.push((key, record_type, pos));
        }

        let commit_key = encode_key_with_seq(TXN_FIN_KEY, seq);
        let commit_record = LogRecord::new(commit_key, Bytes::new(), RecordType::TxnCommit);
        self.engine.append_record_locked(&mut state, &commit_record)?;

        if self.options.sync_writes {
            state.active.sync()?;
            state.bytes_written = 0;
        }

        for (key, record_type, pos) in applied {
            match record_type {
                RecordType::Tombstone => {
                    let (prev, _) = self.engine.index.delete(&key);
                    state.reclaimable_bytes += pos.size;
                    if let Some(prev) = prev {
                        state.reclaimable_bytes += prev.size;
                    }
                }
                _ => {
                    if let Some(prev) = self.engine.index.put(key, pos)? {
                        state.reclaimable_bytes += prev.size;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn opts(dir: &std::path::Path) -> Options {
        let mut o = Options::new(dir);
        o.mmap_at_startup(false);
        o
    }

    #[test]
    fn uncommitted_batch_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let e = Engine::open(opts(dir.path())).unwrap();
        let batch = e.new_write_batch(BatchOptions::default());
        batch.put("a", "1").unwrap();
        assert!(matches!(e.get("a"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn committed_batch_is_visible_and_durable() {
        let dir = tempfile::tempdir().unwrap();
        {
            let e = Engine::open(opts(dir.path())).unwrap();
            let batch = e.new_write_batch(BatchOptions::default());
            batch.put("a", "1").unwrap();
            batch.put("b", "2").unwrap();
            batch.delete("c").unwrap();
            batch.commit().unwrap();
            assert_eq!(e.get("a").unwrap(), Bytes::from_static(b"1"));
            assert_eq!(e.get("b").unwrap(), Bytes::from_static(b"2"));
        }
        let e = Engine::open(opts(dir.path())).unwrap();
        assert_eq!(e.get("a").unwrap(), Bytes::from_static(b"1"));
        assert_eq!(e.get("b").unwrap(), Bytes::from_static(b"2"));
    }

    #[test]
    fn batch_too_large_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let e = Engine::open(opts(dir.path())).unwrap();
        let batch = e.new_write_batch(BatchOptions::default().max_batch_num(1));
        batch.put("a", "1").unwrap();
        batch.put("b", "2").unwrap();
        assert!(matches!(batch.commit(), Err(Error::BatchTooLarge)));
    }
}
