//! File watcher for the pending folder. Signals when documents arrive or change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;

use crate::documents::DocumentKind;

/// Debounce window: a large PDF copy produces many write events.
const DEBOUNCE: Duration = Duration::from_millis(1500);

/// Keeps the watcher alive; dropping it stops the notifications.
pub struct FolderWatch {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<()>,
}

impl FolderWatch {
    /// Waits for the next batch of relevant changes. `None` once the watcher is gone.
    pub async fn changed(&mut self) -> Option<()> {
        let first = self.rx.recv().await;
        // Coalesce anything that queued up while the caller was busy.
        while self.rx.try_recv().is_ok() {}
        first
    }
}

/// Watches `root` (non-recursively) and notifies whenever a PDF or spreadsheet
/// in it is created or changed. Removals are ignored.
pub fn watch_folder(root: &Path) -> Result<FolderWatch, WatchError> {
    watch_folders(&[root])
}

/// Like [`watch_folder`] for several folders at once. Missing folders are
/// skipped with a warning; it is an error only if none of them exist.
pub fn watch_folders(roots: &[&Path]) -> Result<FolderWatch, WatchError> {
    let existing: Vec<&Path> = roots.iter().copied().filter(|r| r.is_dir()).collect();
    for missing in roots.iter().filter(|r| !r.is_dir()) {
        tracing::warn!(folder = %missing.display(), "not watching missing folder");
    }
    let Some(first) = roots.first() else {
        return Err(WatchError::NoFolders);
    };
    if existing.is_empty() {
        return Err(WatchError::NotADirectory(first.to_path_buf()));
    }
    let (tx, rx) = mpsc::unbounded_channel();

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            if events.iter().any(|e| is_arrival(&e.path)) {
                let _ = tx.send(());
            }
        }
        Err(e) => tracing::warn!("watcher error: {e}"),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    for root in existing {
        let root = root.canonicalize().map_err(WatchError::Canonicalize)?;
        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Watch(e.to_string()))?;
        tracing::info!(folder = %root.display(), "watching for new documents");
    }

    Ok(FolderWatch {
        _debouncer: debouncer,
        rx,
    })
}

fn is_document(path: &Path) -> bool {
    DocumentKind::Pdf.matches(path) || DocumentKind::Spreadsheet.matches(path)
}

/// A document that is still there. Files moved out after ingestion do not count.
fn is_arrival(path: &Path) -> bool {
    is_document(path) && path.exists()
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("no folders to watch")]
    NoFolders,
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_documents_trigger() {
        assert!(is_document(Path::new("/in/report.pdf")));
        assert!(is_document(Path::new("/in/dash.xlsx")));
        assert!(!is_document(Path::new("/in/.DS_Store")));
        assert!(!is_document(Path::new("/in/notes.txt")));
    }

    #[test]
    fn moved_out_documents_do_not_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("report.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        assert!(is_arrival(&pdf));
        std::fs::remove_file(&pdf).unwrap();
        assert!(!is_arrival(&pdf));
        assert!(!is_arrival(&dir.path().join("notes.txt")));
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            watch_folder(&dir.path().join("missing")),
            Err(WatchError::NotADirectory(_))
        ));
        assert!(matches!(watch_folders(&[]), Err(WatchError::NoFolders)));
    }

    #[tokio::test]
    async fn partial_folder_list_still_watches() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(watch_folders(&[dir.path(), missing.as_path()]).is_ok());
    }
}
