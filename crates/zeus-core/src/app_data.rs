//! Where Zeus keeps its own data (config, vector index, archived documents).
//!
//! Every path here is only a default; the config file and environment can point
//! each folder somewhere else.

use std::path::PathBuf;

/// Returns the directory where Zeus stores config, the index and archived PDFs.
/// On Linux: `~/.local/share/zeus/`. On macOS: `~/Library/Application Support/Zeus/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Zeus", "Zeus")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Base directory for default folder locations. Falls back to the working
/// directory when no app data directory can be determined (e.g. no `$HOME`).
pub(crate) fn base_dir() -> PathBuf {
    app_data_dir().unwrap_or_else(|| PathBuf::from("."))
}
