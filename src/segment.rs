//! A numbered, append-only data file.

use std::path::{Path, PathBuf};

use crate::codec::{self, LogRecord, MAX_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::io::{FileIo, IoManager, MmapIo};

/// Suffix used by segment files, e.g. `000000001.data`.
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Name of the merge hint file.
pub const HINT_FILE_NAME: &str = "hint";
/// Name of the merge-finished marker file.
pub const MERGE_FINISHED_FILE_NAME: &str = "merged-mark";
/// Name of the directory lock file.
pub const LOCK_FILE_NAME: &str = "flock";

/// Build the path of segment `fid` inside `dir`.
pub fn segment_path(dir: impl AsRef<Path>, fid: u64) -> PathBuf {
    dir.as_ref().join(format!("{:09}{}", fid, DATA_FILE_SUFFIX))
}

/// Parse a segment file name back into its numeric id. Returns `None` for non-segment files
/// (the hint file, the merge marker, the lock file, directories, stray files).
pub fn parse_segment_fid(file_name: &str) -> Option<u64> {
    file_name
        .strip_suffix(DATA_FILE_SUFFIX)
        .and_then(|stem| stem.parse::<u64>().ok())
}

/// A single append-only segment file: a file id, its current write offset, and a pluggable
/// I/O back-end.
pub struct Segment {
    pub fid: u64,
    write_offset: u64,
    io: Box<dyn IoManager>,
}

impl Segment {
    /// Open (creating if absent) the segment `fid` inside `dir`, using the standard I/O
    /// back-end.
    pub fn open(dir: impl AsRef<Path>, fid: u64) -> Result<Self> {
        let io = FileIo::open(segment_path(&dir, fid))?;
        let write_offset = io.size()?;
        Ok(Self {
            fid,
            write_offset,
            io: Box::new(io),
        })
    }

    /// Open an existing segment for read-only replay using the mmap back-end.
    pub fn open_mmap(dir: impl AsRef<Path>, fid: u64) -> Result<Self> {
        let io = MmapIo::open(segment_path(&dir, fid))?;
        let write_offset = io.size()?;
        Ok(Self {
            fid,
            write_offset,
            io: Box::new(io),
        })
    }

    /// Switch this segment back to the standard I/O back-end. Used after replay finishes with
    /// a segment that was opened via [`Segment::open_mmap`].
    pub fn reopen_standard(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let io = FileIo::open(segment_path(&dir, self.fid))?;
        self.io = Box::new(io);
        Ok(())
    }

    /// Append a record, returning `(offset_before_write, bytes_written)`.
    pub fn append(&mut self, record: &LogRecord) -> Result<(u64, u64)> {
        let encoded = record.encode();
        let offset = self.write_offset;
        let n = self.io.write(&encoded)?;
        self.write_offset += n as u64;
        Ok((offset, n as u64))
    }

    /// Read and decode the record at `offset`, returning it plus its total encoded size.
    pub fn read_log_record(&self, offset: u64) -> Result<(LogRecord, u64)> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Err(Error::RecordCorrupted);
        }
        let probe_len = MAX_HEADER_SIZE.min((file_size - offset) as usize);
        let mut header_buf = vec![0u8; probe_len];
        let read = self.io.read_at(&mut header_buf, offset)?;
        header_buf.truncate(read);

        let header = codec::decode_header(&header_buf)?.ok_or(Error::RecordCorrupted)?;
        let header_bytes = &header_buf[..header.header_len];

        let body_len = header.key_size + header.value_size;
        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            let n = self.io.read_at(&mut body, offset + header.header_len as u64)?;
            if n != body_len {
                return Err(Error::RecordCorrupted);
            }
        }

        let record = codec::decode_body(&header, header_bytes, &body)?;
        Ok((record, (header.header_len + body_len) as u64))
    }

    /// Total encoded size currently occupied on disk.
    pub fn size(&self) -> u64 {
        self.write_offset
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordType;
    use bytes::Bytes;

    #[test]
    fn append_then_read_log_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut seg = Segment::open(dir.path(), 1).unwrap();
        let rec = LogRecord::new(Bytes::from_static(b"k"), Bytes::from_static(b"v"), RecordType::Normal);
        let (offset, _) = seg.append(&rec).unwrap();
        let (decoded, _) = seg.read_log_record(offset).unwrap();
        assert_eq!(decoded.key, rec.key);
        assert_eq!(decoded.value, rec.value);
    }

    #[test]
    fn multiple_records_at_sequential_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let mut seg = Segment::open(dir.path(), 1).unwrap();
        let r1 = LogRecord::new(Bytes::from_static(b"a"), Bytes::from_static(b"1"), RecordType::Normal);
        let r2 = LogRecord::new(Bytes::from_static(b"b"), Bytes::from_static(b"2"), RecordType::Normal);
        let (off1, _) = seg.append(&r1).unwrap();
        let (off2, _) = seg.append(&r2).unwrap();
        assert!(off2 > off1);
        let (d1, _) = seg.read_log_record(off1).unwrap();
        let (d2, _) = seg.read_log_record(off2).unwrap();
        assert_eq!(d1.key, r1.key);
        assert_eq!(d2.key, r2.key);
    }

    #[test]
    fn segment_path_uses_nine_digit_zero_padding() {
        let p = segment_path("/tmp/db", 7);
        assert_eq!(p.file_name().unwrap().to_str().unwrap(), "000000007.data");
    }

    #[test]
    fn parse_segment_fid_roundtrips() {
        assert_eq!(parse_segment_fid("000000042.data"), Some(42));
        assert_eq!(parse_segment_fid("hint"), None);
        assert_eq!(parse_segment_fid("merged-mark"), None);
        assert_eq!(parse_segment_fid("flock"), None);
    }
}
