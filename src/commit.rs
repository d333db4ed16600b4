//! Whole-file replacement
//!
//! Content goes to a sibling temp file first and is renamed over the target,
//! so a reader sees either the old file or the new one.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const COMMIT_SUFFIX: &str = ".lintpatch.tmp";

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(COMMIT_SUFFIX);
    PathBuf::from(name)
}

/// Replace `path` with `content`, keeping the original's permissions.
///
/// A symlinked `path` is resolved first: the file it points at is replaced
/// and the link itself stays in place.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let target = fs::canonicalize(path)?;
    let path = target.as_path();
    let permissions = fs::metadata(path)?.permissions();
    let tmp_path = staging_path(path);

    let result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::set_permissions(&tmp_path, permissions)?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
