//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path).

use std::io::Write;
use std::path::Path;

use crate::{Error, Result};

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| Error::io_path("creating directory", parent, e)),
        _ => Ok(()),
    }
}

/// Write `contents` to `path` through a temporary file in the same directory, then
/// rename it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::io_path("creating temporary file in", dir, e))?;
    temp.write_all(contents)
        .map_err(|e| Error::io_path("writing", temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io_path("syncing", temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| Error::io_path("replacing", path, e.error))?;
    Ok(())
}
