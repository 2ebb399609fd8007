//! Merge (compaction): rewrite live records into a fresh sibling directory, write a hint file
//! of their new positions, and mark the result with an atomicity-gating `merged-mark` file.
//! The rewritten data only replaces the original segments on the *next* `Engine::open`.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::codec::{decode_key_with_seq, encode_key_with_seq, encode_position, LogRecord, RecordType};
use crate::engine::{merge_dir_path, Engine};
use crate::error::{Error, Result};
use crate::index::{Indexer, Position};
use crate::segment::{Segment, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME};
use crate::util;

/// Run a merge against `engine`. See the module docs and `SPEC_FULL.md` §4.6.
pub(crate) fn run(engine: &Engine) -> Result<()> {
    let (fids_to_merge, first_non_merged_fid) = prepare(engine)?;

    let result = rewrite(engine, &fids_to_merge, first_non_merged_fid);

    engine.state.write().is_merging = false;

    result
}

/// Precondition checks plus rolling the active segment so every current byte is immutable.
/// Returns the set of segment ids to merge and the fid of the (now-active) segment that marks
/// the boundary between merged and not-yet-merged data.
fn prepare(engine: &Engine) -> Result<(Vec<u64>, u64)> {
    let mut state = engine.state.write();
    if state.is_merging {
        return Err(Error::MergeInProgress);
    }

    let total: u64 = state.active.size() + state.older.values().map(|s| s.size()).sum::<u64>();
    let reclaimable = state.reclaimable_bytes;
    if total == 0 || (reclaimable as f64 / total as f64) < engine.options.merge_ratio_threshold {
        return Err(Error::RatioNotReached);
    }

    let available = util::available_space(engine.dir_path())?;
    if total.saturating_sub(reclaimable) >= available {
        return Err(Error::InsufficientSpace);
    }

    state.is_merging = true;
    engine.roll_active_for_merge(&mut state)?;
    let first_non_merged_fid = state.active.fid;
    let mut fids: Vec<u64> = state.older.keys().copied().collect();
    fids.sort_unstable();

    Ok((fids, first_non_merged_fid))
}

/// Rewrite the live records of `fids_to_merge` into `<dir>-merge`, writing a hint file
/// alongside, then stamp the merge complete with `merged-mark`. Runs without holding the
/// engine's write lock: concurrent writers append to the (already rolled-past) active segment
/// undisturbed.
fn rewrite(engine: &Engine, fids_to_merge: &[u64], first_non_merged_fid: u64) -> Result<()> {
    let dir = engine.dir_path();
    let merge_dir = merge_dir_path(dir);
    if merge_dir.exists() {
        fs::remove_dir_all(&merge_dir)?;
    }
    fs::create_dir_all(&merge_dir)?;

    let mut writer = MergeWriter::new(&merge_dir, engine.options.data_file_size.as_u64())?;
    let mut hint = HintWriter::create(&merge_dir)?;

    for &fid in fids_to_merge {
        let source = Segment::open(dir, fid)?;
        let mut offset = 0u64;
        loop {
            let (record, size) = match source.read_log_record(offset) {
                Ok(r) => r,
                Err(_) => break,
            };
            let candidate_pos = Position::new(fid, offset, size);
            offset += size;

            if record.record_type == RecordType::TxnCommit {
                continue;
            }
            let (_, user_key) = decode_key_with_seq(&record.key)?;
            if record.record_type == RecordType::Tombstone {
                continue;
            }
            if engine.index.get(&user_key) != Some(candidate_pos) {
                continue; // superseded or deleted since this record was written
            }

            let rewritten = LogRecord::new(
                encode_key_with_seq(&user_key, 0),
                record.value.clone(),
                RecordType::Normal,
            );
            let new_pos = writer.append(&rewritten)?;
            hint.push(user_key, new_pos)?;
        }
    }

    writer.sync()?;
    hint.sync()?;
    write_marker(&merge_dir, first_non_merged_fid)?;
    Ok(())
}

fn write_marker(merge_dir: &Path, first_non_merged_fid: u64) -> Result<()> {
    let record = LogRecord::new(
        Bytes::from_static(b"merged"),
        Bytes::from(first_non_merged_fid.to_string()),
        RecordType::Normal,
    );
    fs::write(merge_dir.join(MERGE_FINISHED_FILE_NAME), record.encode())?;
    Ok(())
}

/// Writes rewritten live records into freshly numbered segments under the merge directory,
/// rolling over at the same size threshold the live engine uses.
struct MergeWriter {
    dir: PathBuf,
    segment: Segment,
    max_size: u64,
}

impl MergeWriter {
    fn new(dir: &Path, max_size: u64) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            segment: Segment::open(dir, 0)?,
            max_size,
        })
    }

    fn append(&mut self, record: &LogRecord) -> Result<Position> {
        let encoded_len = record.encode().len() as u64;
        if self.segment.size() + encoded_len > self.max_size {
            self.segment.sync()?;
            self.segment = Segment::open(&self.dir, self.segment.fid + 1)?;
        }
        let (offset, size) = self.segment.append(record)?;
        Ok(Position::new(self.segment.fid, offset, size))
    }

    fn sync(&self) -> Result<()> {
        self.segment.sync()
    }
}

/// Appends `(user_key, position)` pairs to the merge directory's `hint` file.
struct HintWriter {
    file: fs::File,
}

impl HintWriter {
    fn create(dir: &Path) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dir.join(HINT_FILE_NAME))?;
        Ok(Self { file })
    }

    fn push(&mut self, key: Bytes, pos: Position) -> Result<()> {
        use std::io::Write;
        let value = encode_position(pos.fid, pos.offset, pos.size);
        let record = LogRecord::new(key, value, RecordType::Normal);
        self.file.write_all(&record.encode())?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
