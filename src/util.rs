//! Filesystem helpers backing `Engine::stat`, `Engine::backup`, and startup segment discovery.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::segment::{parse_segment_fid, DATA_FILE_SUFFIX};

/// Enumerate the segment ids present in `dir`, sorted ascending. Non-segment files (the lock
/// file, hint file, merge marker) are ignored. A `*.data` file whose name cannot be parsed as a
/// segment id means the directory has been tampered with or corrupted; that fails the whole open
/// rather than silently skipping the file.
pub fn sorted_segment_fids(dir: impl AsRef<Path>) -> Result<Vec<u64>> {
    let mut fids = Vec::new();
    if !dir.as_ref().exists() {
        return Ok(fids);
    }
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(DATA_FILE_SUFFIX) {
                match parse_segment_fid(name) {
                    Some(fid) => fids.push(fid),
                    None => return Err(Error::DirectoryCorrupted(entry.path())),
                }
            }
        }
    }
    fids.sort_unstable();
    Ok(fids)
}

/// Recursively sum the size of every regular file directly and indirectly under `dir`.
pub fn dir_size(dir: impl AsRef<Path>) -> Result<u64> {
    let mut total = 0u64;
    if !dir.as_ref().exists() {
        return Ok(total);
    }
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Free space available on the filesystem that backs `path`.
pub fn available_space(path: impl AsRef<Path>) -> Result<u64> {
    Ok(fs4::available_space(path)?)
}

/// Recursively copy every regular file under `src` into `dst`, creating directories as needed,
/// skipping `exclude` (used to keep the lock file out of backups).
pub fn copy_dir(src: impl AsRef<Path>, dst: impl AsRef<Path>, exclude: &[&str]) -> Result<()> {
    fs::create_dir_all(&dst)?;
    for entry in fs::read_dir(&src)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(name_str) = name.to_str() {
            if exclude.contains(&name_str) {
                continue;
            }
        }
        let src_path = entry.path();
        let dst_path = dst.as_ref().join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir(&src_path, &dst_path, exclude)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn sorted_fids_ignores_non_segment_files() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("000000002.data")).unwrap();
        File::create(dir.path().join("000000001.data")).unwrap();
        File::create(dir.path().join("hint")).unwrap();
        File::create(dir.path().join("flock")).unwrap();
        let fids = sorted_segment_fids(dir.path()).unwrap();
        assert_eq!(fids, vec![1, 2]);
    }

    #[test]
    fn unparsable_data_file_name_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("000000001.data")).unwrap();
        File::create(dir.path().join("not-a-fid.data")).unwrap();
        assert!(matches!(
            sorted_segment_fids(dir.path()),
            Err(Error::DirectoryCorrupted(_))
        ));
    }

    #[test]
    fn dir_size_sums_recursively() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("a")).unwrap().write_all(b"12345").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub/b")).unwrap().write_all(b"123").unwrap();
        assert_eq!(dir_size(dir.path()).unwrap(), 8);
    }

    #[test]
    fn copy_dir_skips_excluded_names() {
        let src = tempfile::tempdir().unwrap();
        File::create(src.path().join("flock")).unwrap();
        File::create(src.path().join("000000001.data")).unwrap().write_all(b"x").unwrap();
        let dst = tempfile::tempdir().unwrap();
        copy_dir(src.path(), dst.path(), &["flock"]).unwrap();
        assert!(!dst.path().join("flock").exists());
        assert!(dst.path().join("000000001.data").exists());
    }
}
