//! Log file rotation.
//!
//! The subscriber itself is installed by the binary; this module only
//! makes sure the file it writes to exists and stays bounded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PlatformError;

/// Size at which `jdb.log` is rotated (10 MB).
pub const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated generations kept next to the live file.
pub const MAX_LOG_FILES: u32 = 5;

/// Create the parent directory and rotate `path` if it has grown past
/// [`MAX_LOG_SIZE`].
///
/// # Errors
///
/// `PlatformError::LogFile` when the directory cannot be created or a
/// rename fails.
pub fn prepare_log_file(path: &Path) -> Result<(), PlatformError> {
    let wrap = |source: io::Error| PlatformError::LogFile {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    rotate_log_files(path, MAX_LOG_SIZE, MAX_LOG_FILES).map_err(wrap)
}

/// Shift `jdb.log` to `jdb.log.1`, `.1` to `.2` and so on, dropping
/// generation `max_files`. No-op while the file is under `max_size`.
pub fn rotate_log_files(path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if len < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = generation(path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = generation(path, i);
        if from.exists() {
            fs::rename(&from, generation(path, i + 1))?;
        }
    }
    fs::rename(path, generation(path, 1))
}

fn generation(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
