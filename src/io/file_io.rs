//! Standard positional file I/O, used for the active segment and for any immutable segment
//! once startup replay has finished with it.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;
use crate::io::IoManager;

/// Append-only file handle backed by `O_CREATE | O_RDWR` plus positioned reads/writes.
#[derive(Debug)]
pub struct FileIo {
    file: Mutex<File>,
}

impl FileIo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl IoManager for FileIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.file.lock().unwrap();
        let mut total = 0;
        while total < buf.len() {
            match file.read_at(&mut buf[total..], offset + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        let file = self.file.lock().unwrap();
        file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        let file = self.file.lock().unwrap();
        Ok(file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_at_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let io = FileIo::open(dir.path().join("f.data")).unwrap();
        io.write(b"hello world").unwrap();
        let mut buf = [0u8; 5];
        let n = io.read_at(&mut buf, 6).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn size_reflects_appended_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let io = FileIo::open(dir.path().join("f.data")).unwrap();
        io.write(b"12345").unwrap();
        assert_eq!(io.size().unwrap(), 5);
        io.write(b"67890").unwrap();
        assert_eq!(io.size().unwrap(), 10);
    }
}
