//! Atomic file replacement for the local store.
//!
//! Content goes to a temporary sibling first, is synced, then renamed over
//! the target, so readers see either the old bytes or the new ones. The
//! temporary name carries the process id: two sessions writing the same
//! sidecar never share a temporary file. Long names are shortened in the
//! temporary name. A crash can leave a `.{filename}.{pid}.tmp` behind.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file, creating parent directories.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path)?;
    if let Err(e) = write_and_sync(&temp_path, content).and_then(|_| fs::rename(&temp_path, path))
    {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

fn temp_path_for(target: &Path) -> io::Result<PathBuf> {
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file path '{}'", target.display()),
            )
        })?;
    let parent = target.parent().unwrap_or(Path::new("."));
    Ok(parent.join(format!(
        ".{}.{}.tmp",
        truncate_at_char_boundary(filename, TEMP_NAME_BYTES),
        std::process::id()
    )))
}

/// Longest slice of the target name carried into a temp name; keeps the temp
/// name within the 255-byte limit common to filesystems.
const TEMP_NAME_BYTES: usize = 200;

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn write_and_sync(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}
