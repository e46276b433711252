//! Filesystem helpers

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Hidden sibling that holds the bytes until they are complete
///
/// `data/20250101_120000_ab12cd34.sweep` stages as
/// `data/.20250101_120000_ab12cd34.sweep.partial`. The leading `.` leaves an
/// empty artifact stem, so a leftover never carries a configuration hash.
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

/// Replace `path` with `content` in one rename.
///
/// On failure the staging file is removed and `path` is untouched.
pub fn atomic_write_bytes(path: &Path, content: &[u8]) -> io::Result<()> {
    let staged = staging_path(path);
    let written = fs::write(&staged, content).and_then(|()| fs::rename(&staged, path));
    if written.is_err() {
        let _ = fs::remove_file(&staged);
    }
    written
}

/// Text variant of [`atomic_write_bytes`]
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    atomic_write_bytes(path, content.as_bytes())
}

/// File name up to its first `.`
///
/// `20250101_120000_ab12cd34.log.1.zst` and `20250101_120000_ab12cd34.sweep`
/// share the stem `20250101_120000_ab12cd34`.
pub fn artifact_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.split('.').next()
}

/// Remove everything inside `dir`, keeping the directory itself.
pub fn clear_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
