//! Read-only memory-mapped I/O, used only while replaying segments during `Engine::open` when
//! `Options::mmap_at_startup` is set. Every segment is switched back to `FileIo` once replay
//! completes, since mmap cannot service writes.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::io::IoManager;

/// Read-only mmap-backed view of a data file. `memmap2` refuses to map a zero-length file, which
/// a never-written active segment left behind by a prior run would be, so that case is handled
/// without a backing mapping at all.
pub struct MmapIo {
    mmap: Option<Mmap>,
}

impl MmapIo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { mmap: None });
        }
        // SAFETY: the mapped file is only ever mutated by this process's own appends, which
        // happen through a `FileIo` handle on the *active* segment; mmap replay is only ever
        // performed against already-closed-for-writing (or not-yet-reopened) segments.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap: Some(mmap) })
    }
}

impl IoManager for MmapIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let Some(mmap) = self.mmap.as_ref() else {
            return Ok(0);
        };
        let offset = offset as usize;
        if offset >= mmap.len() {
            return Ok(0);
        }
        let n = buf.len().min(mmap.len() - offset);
        buf[..n].copy_from_slice(&mmap[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "mmap I/O backend is read-only",
        )))
    }

    fn sync(&self) -> Result<()> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "mmap I/O backend is read-only",
        )))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.mmap.as_ref().map_or(0, |m| m.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_back_preexisting_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.data");
        std::fs::File::create(&path).unwrap().write_all(b"abcdef").unwrap();
        let io = MmapIo::open(&path).unwrap();
        let mut buf = [0u8; 3];
        io.read_at(&mut buf, 2).unwrap();
        assert_eq!(&buf, b"cde");
    }

    #[test]
    fn write_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.data");
        std::fs::File::create(&path).unwrap();
        let io = MmapIo::open(&path).unwrap();
        assert!(io.write(b"x").is_err());
    }

    #[test]
    fn empty_file_maps_to_zero_size_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.data");
        std::fs::File::create(&path).unwrap();
        let io = MmapIo::open(&path).unwrap();
        assert_eq!(io.size().unwrap(), 0);
        let mut buf = [0u8; 4];
        assert_eq!(io.read_at(&mut buf, 0).unwrap(), 0);
    }
}
