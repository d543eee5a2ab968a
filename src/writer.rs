//! Tree writer: persists rewritten source, optionally keeping a backup

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::error::{InstrumentError, Result};

/// Timestamp format appended to backup file names
pub const BACKUP_TIMESTAMP: &str = "%Y%m%d%H%M%S";

/// `<original-name>_<YYYYMMDDHHMMSS>` next to the original
pub fn backup_path(path: &Path, at: DateTime<Local>) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push("_");
    name.push(at.format(BACKUP_TIMESTAMP).to_string());
    path.with_file_name(name)
}

/// Copy the current contents of `path` to its timestamped backup
///
/// Any failure is fatal: the overwrite must not happen without its backup.
pub fn backup(path: &Path, at: DateTime<Local>) -> Result<PathBuf> {
    let target = backup_path(path, at);
    fs::copy(path, &target).map_err(|source| InstrumentError::Backup {
        path: path.to_path_buf(),
        source,
    })?;
    info!(original = %path.display(), backup = %target.display(), "backup written");
    Ok(target)
}

/// Replace the contents of `path` with `contents`
///
/// The file is truncated first, so shorter output never leaves stale bytes
/// from the previous version behind.
pub fn overwrite(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| InstrumentError::io(path, e))?;
    info!(path = %path.display(), bytes = contents.len(), "instrumented source written");
    Ok(())
}

/// Back up `path` when requested, then overwrite it
///
/// Returns the backup location, if one was made.
pub fn write_back(path: &Path, contents: &str, make_backup: bool) -> Result<Option<PathBuf>> {
    let backup = if make_backup {
        Some(backup(path, Local::now())?)
    } else {
        None
    };
    overwrite(path, contents)?;
    Ok(backup)
}
