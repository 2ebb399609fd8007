//! The engine: binds the record codec, segments, and key directory together into the public
//! key/value store contract.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::batch::WriteBatch;
use crate::codec::{self, decode_key_with_seq, encode_key_with_seq, LogRecord, RecordType};
use crate::error::{Error, Result};
use crate::index::{self, Indexer, Position};
use crate::iterator::EngineIterator;
use crate::lock::DirLock;
use crate::options::{BatchOptions, IteratorOptions, Options};
use crate::segment::{self, Segment, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME};
use crate::util;

/// Aggregate counters and handles the engine-wide write lock protects, matching the spec's
/// list of state guarded by the single readers/writer mutex: the active segment, the immutable
/// segment map, bytes written since the last sync, reclaimable bytes, and the merge flag.
pub(crate) struct EngineState {
    pub(crate) active: Segment,
    pub(crate) older: HashMap<u64, Segment>,
    pub(crate) bytes_written: u64,
    pub(crate) reclaimable_bytes: u64,
    pub(crate) is_merging: bool,
}

/// An open, embeddable, persistent, ordered key/value store.
pub struct Engine {
    pub(crate) options: Options,
    pub(crate) index: Box<dyn Indexer>,
    pub(crate) state: RwLock<EngineState>,
    pub(crate) seq_no: AtomicU64,
    pub(crate) batch_commit_lock: Mutex<()>,
    _dir_lock: DirLock,
}

/// Point-in-time counters returned by [`Engine::stat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Stat {
    pub key_count: usize,
    pub data_file_count: usize,
    pub reclaimable_bytes: u64,
    pub occupied_bytes: u64,
}

impl Engine {
    /// Open (creating if absent) a store at `options.dir_path`, replaying its log to rebuild
    /// the key directory.
    pub fn open(options: Options) -> Result<Self> {
        options.validate()?;
        let dir = options.dir_path.clone();
        fs::create_dir_all(&dir)?;

        let dir_lock = DirLock::acquire(&dir)?;

        apply_pending_merge(&dir)?;

        let fids = util::sorted_segment_fids(&dir)?;
        let index = index::new_indexer(options.index_type);

        let (state, next_seq) = load_segments_and_replay(&dir, &fids, &options, index.as_ref())?;

        debug!(active_fid = state.active.fid, ?fids, "opened store");

        Ok(Self {
            options,
            index,
            state: RwLock::new(state),
            seq_no: AtomicU64::new(next_seq),
            batch_commit_lock: Mutex::new(()),
            _dir_lock: dir_lock,
        })
    }

    pub(crate) fn dir_path(&self) -> &Path {
        &self.options.dir_path
    }

    /// Set a key's value, overwriting any existing value.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let record_key = encode_key_with_seq(&key, 0);
        let record = LogRecord::new(record_key, value.into(), RecordType::Normal);
        let pos = self.append_record(&record)?;
        if let Some(prev) = self.index.put(key, pos)? {
            self.charge_reclaimable(prev.fid, prev.size);
        }
        Ok(())
    }

    /// Fetch a key's value, or `Error::KeyNotFound` if absent or tombstoned.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Bytes> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        let record = self.read_at(pos)?;
        match record.record_type {
            RecordType::Tombstone => Err(Error::KeyNotFound),
            _ => Ok(record.value),
        }
    }

    /// Delete a key. A no-op (returning `Ok(())`) if the key is absent.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if self.index.get(key).is_none() {
            return Ok(());
        }
        let record_key = encode_key_with_seq(key, 0);
        let record = LogRecord::new(record_key, Bytes::new(), RecordType::Tombstone);
        let tombstone_pos = self.append_record(&record)?;
        let (prev, _) = self.index.delete(key);
        self.charge_reclaimable(tombstone_pos.fid, tombstone_pos.size);
        if let Some(prev) = prev {
            self.charge_reclaimable(prev.fid, prev.size);
        }
        Ok(())
    }

    /// All live keys, in the index's natural order.
    pub fn list_keys(&self) -> Result<Vec<Bytes>> {
        let mut iter = self.index.iter(false)?;
        let mut keys = Vec::new();
        iter.rewind();
        while iter.valid() {
            keys.push(Bytes::copy_from_slice(iter.key()));
            iter.next();
        }
        Ok(keys)
    }

    /// A cursor over live keys, honoring `options.prefix`/`options.reverse`.
    pub fn iter(&self, options: IteratorOptions) -> Result<EngineIterator<'_>> {
        EngineIterator::new(self, options)
    }

    /// Start a new atomic multi-key write batch.
    pub fn new_write_batch(&self, options: BatchOptions) -> WriteBatch<'_> {
        WriteBatch::new(self, options)
    }

    /// Force the active segment's buffers to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.state.read().active.sync()
    }

    /// Point-in-time counters about the store.
    pub fn stat(&self) -> Result<Stat> {
        let state = self.state.read();
        Ok(Stat {
            key_count: self.index.len(),
            data_file_count: state.older.len() + 1,
            reclaimable_bytes: state.reclaimable_bytes,
            occupied_bytes: util::dir_size(self.dir_path())?,
        })
    }

    /// Copy the data directory (excluding the lock file) to `dest` while holding a read lock.
    pub fn backup(&self, dest: impl AsRef<Path>) -> Result<()> {
        let _state = self.state.read();
        util::copy_dir(self.dir_path(), dest, &[segment::LOCK_FILE_NAME])
    }

    /// Run a merge, reclaiming space from overwritten and deleted records. See
    /// `crate::merge` for the full algorithm; the rewritten data only becomes visible to this
    /// engine instance after it is closed and reopened.
    pub fn merge(&self) -> Result<()> {
        crate::merge::run(self)
    }

    /// Flush, close every segment, and release the directory lock.
    pub fn close(&self) -> Result<()> {
        let state = self.state.read();
        state.active.sync()?;
        Ok(())
    }

    /// Append a single non-transactional record (sequence 0 is already baked into the record's
    /// key by the caller) and return its position. Used directly by `put`/`delete`.
    fn append_record(&self, record: &LogRecord) -> Result<Position> {
        let mut state = self.state.write();
        self.append_record_locked(&mut state, record)
    }

    /// Append one record under an already-held write lock. Shared by `append_record` and by
    /// the write-batch commit path, which holds the lock across every record in the batch.
    pub(crate) fn append_record_locked(
        &self,
        state: &mut EngineState,
        record: &LogRecord,
    ) -> Result<Position> {
        let encoded_len = record.encode().len() as u64;
        if state.active.size() + encoded_len > self.options.data_file_size.as_u64() {
            self.roll_active_for_merge(state)?;
        }

        let (offset, size) = state.active.append(record)?;
        let fid = state.active.fid;
        state.bytes_written += size;

        let should_sync = self.options.sync_writes
            || (self.options.sync_per_bytes > 0 && state.bytes_written >= self.options.sync_per_bytes);
        if should_sync {
            state.active.sync()?;
            state.bytes_written = 0;
        }

        Ok(Position::new(fid, offset, size))
    }

    pub(crate) fn roll_active_for_merge(&self, state: &mut EngineState) -> Result<()> {
        state.active.sync()?;
        let old_fid = state.active.fid;
        let new_fid = old_fid + 1;
        let new_active = Segment::open(self.dir_path(), new_fid)?;
        let old_active = std::mem::replace(&mut state.active, new_active);
        state.older.insert(old_fid, old_active);
        state.bytes_written = 0;
        debug!(new_fid, "rolled active segment");
        Ok(())
    }

    pub(crate) fn read_at(&self, pos: Position) -> Result<LogRecord> {
        let state = self.state.read();
        if pos.fid == state.active.fid {
            Ok(state.active.read_log_record(pos.offset)?.0)
        } else {
            let seg = state
                .older
                .get(&pos.fid)
                .ok_or(Error::DataFileNotFound(pos.fid))?;
            Ok(seg.read_log_record(pos.offset)?.0)
        }
    }

    fn charge_reclaimable(&self, _fid: u64, size: u64) {
        let mut state = self.state.write();
        state.reclaimable_bytes += size;
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Apply a merge left pending from a previous run: if `<dir>-merge` carries a well-formed
/// `merged-mark`, delete segments below its recorded first-non-merged fid and move the merge
/// directory's contents in. Absence of the marker means an interrupted merge; it is discarded.
fn apply_pending_merge(dir: &Path) -> Result<()> {
    let merge_dir = merge_dir_path(dir);
    if !merge_dir.exists() {
        return Ok(());
    }
    let marker_path = merge_dir.join(MERGE_FINISHED_FILE_NAME);
    if !marker_path.exists() {
        warn!(?merge_dir, "discarding interrupted merge");
        fs::remove_dir_all(&merge_dir)?;
        return Ok(());
    }

    let marker_bytes = fs::read(&marker_path)?;
    let marker_record = parse_marker_record(&marker_bytes)?;
    let first_non_merged_fid: u64 = std::str::from_utf8(&marker_record)
        .map_err(|_| Error::DirectoryCorrupted(marker_path.clone()))?
        .parse()
        .map_err(|_| Error::DirectoryCorrupted(marker_path.clone()))?;

    for fid in util::sorted_segment_fids(dir)? {
        if fid < first_non_merged_fid {
            let _ = fs::remove_file(segment::segment_path(dir, fid));
        }
    }

    for entry in fs::read_dir(&merge_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        fs::rename(entry.path(), dir.join(&name))?;
    }
    fs::remove_dir_all(&merge_dir)?;
    Ok(())
}

/// The `merged-mark` file stores a single log record whose value is the decimal fid. Decode
/// just enough of the framing to pull the value out.
fn parse_marker_record(buf: &[u8]) -> Result<Bytes> {
    let header = codec::decode_header(buf)?.ok_or(Error::RecordCorrupted)?;
    let body = &buf[header.header_len..];
    let record = codec::decode_body(&header, &buf[..header.header_len], body)?;
    Ok(record.value)
}

pub(crate) fn merge_dir_path(dir: &Path) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("-merge");
    dir.with_file_name(name)
}

/// Open every segment (standard or mmap per `options.mmap_at_startup`), replay the hint file if
/// present, then replay data files in ascending fid order, skipping any fid already covered by
/// the hint file's segment range. Buffers per-sequence batch records until their commit
/// sentinel is observed.
fn load_segments_and_replay(
    dir: &Path,
    fids: &[u64],
    options: &Options,
    index: &dyn Indexer,
) -> Result<(EngineState, u64)> {
    let active_fid = fids.last().copied().map(|f| f + 1).unwrap_or(0);

    let mut segments: HashMap<u64, Segment> = HashMap::new();
    for &fid in fids {
        let seg = if options.mmap_at_startup {
            Segment::open_mmap(dir, fid)?
        } else {
            Segment::open(dir, fid)?
        };
        segments.insert(fid, seg);
    }

    let hint_path = dir.join(HINT_FILE_NAME);
    let first_non_merged_fid = if hint_path.exists() {
        replay_hint_file(dir, index)?
    } else {
        None
    };

    let mut max_seq = 0u64;
    let mut pending: HashMap<u64, Vec<(Bytes, LogRecord, Position)>> = HashMap::new();

    for &fid in fids {
        if let Some(first_non_merged) = first_non_merged_fid {
            if fid < first_non_merged {
                continue;
            }
        }
        let seg = segments.get(&fid).expect("segment just opened above");
        let mut offset = 0u64;
        loop {
            let (record, size) = match seg.read_log_record(offset) {
                Ok(r) => r,
                Err(_) => break,
            };
            let (seq, user_key) = decode_key_with_seq(&record.key)?;
            max_seq = max_seq.max(seq);
            let pos = Position::new(fid, offset, size);

            if record.record_type == RecordType::TxnCommit {
                if let Some(batch) = pending.remove(&seq) {
                    for (k, r, p) in batch {
                        apply_replayed_record(index, k, &r, p);
                    }
                }
            } else if seq == 0 {
                apply_replayed_record(index, user_key, &record, pos);
            } else {
                pending.entry(seq).or_default().push((user_key, record, pos));
            }

            offset += size;
        }
    }

    let active = match segments.remove(&active_fid) {
        Some(seg) => seg,
        None => Segment::open(dir, active_fid)?,
    };
    let mut active = active;
    if options.mmap_at_startup {
        active.reopen_standard(dir)?;
    }

    let mut older = HashMap::new();
    for (fid, mut seg) in segments {
        if options.mmap_at_startup {
            seg.reopen_standard(dir)?;
        }
        older.insert(fid, seg);
    }

    let state = EngineState {
        active,
        older,
        bytes_written: 0,
        reclaimable_bytes: 0,
        is_merging: false,
    };

    Ok((state, max_seq + 1))
}

fn apply_replayed_record(index: &dyn Indexer, key: Bytes, record: &LogRecord, pos: Position) {
    match record.record_type {
        RecordType::Tombstone => {
            index.delete(&key);
        }
        _ => {
            let _ = index.put(key, pos);
        }
    }
}

/// Decode the hint file, inserting every `(key, position)` pair it names directly into the
/// index, and return the first-non-merged fid recorded by the sibling `merged-mark` if present
/// (used to skip already-accounted-for segments during data-file replay).
fn replay_hint_file(dir: &Path, index: &dyn Indexer) -> Result<Option<u64>> {
    let hint_path = dir.join(HINT_FILE_NAME);
    let data = fs::read(&hint_path)?;
    let mut offset = 0usize;
    while offset < data.len() {
        let header = match codec::decode_header(&data[offset..]) {
            Ok(Some(h)) => h,
            _ => break,
        };
        let header_bytes = &data[offset..offset + header.header_len];
        let body_start = offset + header.header_len;
        let body_end = body_start + header.key_size + header.value_size;
        if body_end > data.len() {
            break;
        }
        let record = codec::decode_body(&header, header_bytes, &data[body_start..body_end])?;
        let (fid, pos_offset, size) = codec::decode_position(&record.value)?;
        index.put(record.key, Position::new(fid, pos_offset, size))?;
        offset = body_end;
    }

    let marker_path = dir.join(MERGE_FINISHED_FILE_NAME);
    if marker_path.exists() {
        let marker_bytes = fs::read(&marker_path)?;
        let value = parse_marker_record(&marker_bytes)?;
        let fid: u64 = std::str::from_utf8(&value)
            .map_err(|_| Error::DirectoryCorrupted(marker_path.clone()))?
            .parse()
            .map_err(|_| Error::DirectoryCorrupted(marker_path.clone()))?;
        Ok(Some(fid))
    } else {
        Ok(None)
    }
}
