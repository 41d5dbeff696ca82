//! Cache locations and atomic file writes.
//!
//! Patch files and manifests are written to a uniquely named temporary file
//! in the target directory and renamed into place, so an existing target is
//! always a completely written one.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, DatasetResult};

/// Get the default cache directory.
///
/// Uses `SPLITSET_CACHE_DIR` env var if set, otherwise `~/.cache/splitset`.
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SPLITSET_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cache").join("splitset")
}

/// Atomically create `target` by streaming into a temp file + rename.
///
/// Concurrent writers of the same target each use their own temp file;
/// the last rename wins and readers never observe a partial file.
pub fn atomic_write_with<F>(target: &Path, write: F) -> DatasetResult<()>
where
    F: FnOnce(&mut BufWriter<&mut std::fs::File>) -> DatasetResult<()>,
{
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| DatasetError::Io(e.error))?;
    Ok(())
}

/// Atomically write a byte buffer to `target`.
pub fn atomic_write(target: &Path, data: &[u8]) -> DatasetResult<()> {
    atomic_write_with(target, |w| {
        w.write_all(data)?;
        Ok(())
    })
}
