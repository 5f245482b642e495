//! Discovering and extracting text from PDFs and spreadsheets in a folder.
//!
//! One text unit per PDF page and per spreadsheet sheet; no further splitting.
//! A file that can't be read or parsed is logged and skipped, never fatal.

use std::fmt;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Which loader handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Spreadsheet,
}

impl DocumentKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            DocumentKind::Pdf => &["pdf"],
            DocumentKind::Spreadsheet => &["xlsx", "xls"],
        }
    }

    /// Case-insensitive extension match.
    pub fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .map_or(false, |e| self.extensions().contains(&e.as_str()))
    }
}

/// Where in its document a text unit came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitLocation {
    /// 1-based page number.
    Page(u32),
    Sheet(String),
}

impl fmt::Display for UnitLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitLocation::Page(n) => write!(f, "page-{n}"),
            UnitLocation::Sheet(name) => write!(f, "sheet-{name}"),
        }
    }
}

/// Extracted text plus where it came from. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    /// Stable identifier: `<file name>#<location>`. Re-ingesting the same
    /// page or sheet produces the same id.
    pub id: String,
    pub text: String,
    pub source: PathBuf,
    pub location: UnitLocation,
}

impl TextUnit {
    pub fn new(source: &Path, location: UnitLocation, text: String) -> Self {
        Self {
            id: format!("{}#{}", file_name(source), location),
            text,
            source: source.to_path_buf(),
            location,
        }
    }
}

/// A file that loaded cleanly.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    /// SHA-256 of the file bytes, hex encoded.
    pub content_hash: String,
    pub units: Vec<TextUnit>,
}

impl LoadedDocument {
    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }
}

/// All units from a folder plus the files that loaded successfully.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub units: Vec<TextUnit>,
    pub loaded: Vec<PathBuf>,
}

/// Loads every recognized file of one kind from a single folder (not recursive).
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    folder: PathBuf,
    kind: DocumentKind,
}

impl DocumentLoader {
    pub fn new(folder: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            folder: folder.into(),
            kind,
        }
    }

    pub fn pdfs(folder: impl Into<PathBuf>) -> Self {
        Self::new(folder, DocumentKind::Pdf)
    }

    pub fn spreadsheets(folder: impl Into<PathBuf>) -> Self {
        Self::new(folder, DocumentKind::Spreadsheet)
    }

    /// Recognized files in the folder, sorted by name. A missing folder yields none.
    pub fn candidate_files(&self) -> Vec<PathBuf> {
        if !self.folder.is_dir() {
            match self.kind {
                DocumentKind::Spreadsheet => tracing::warn!(
                    folder = %self.folder.display(),
                    "spreadsheet folder does not exist"
                ),
                DocumentKind::Pdf => tracing::debug!(
                    folder = %self.folder.display(),
                    "pending folder does not exist"
                ),
            }
            return Vec::new();
        }
        WalkDir::new(&self.folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && !is_hidden(e))
            .map(|e| e.into_path())
            .filter(|p| self.kind.matches(p))
            .collect()
    }

    /// Lazily loads each file; failures are logged and skipped.
    pub fn documents(&self) -> impl Iterator<Item = LoadedDocument> + '_ {
        self.candidate_files()
            .into_iter()
            .filter_map(move |path| match load_document(&path, self.kind) {
                Ok(doc) => {
                    tracing::info!(
                        file = %doc.file_name(),
                        units = doc.units.len(),
                        "loaded document"
                    );
                    Some(doc)
                }
                Err(e) => {
                    tracing::warn!("failed to load document: {e}");
                    None
                }
            })
    }

    /// Loads everything at once.
    pub fn load_all(&self) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        for doc in self.documents() {
            outcome.loaded.push(doc.path);
            outcome.units.extend(doc.units);
        }
        outcome
    }
}

/// Read one file and extract its text units.
pub fn load_document(path: &Path, kind: DocumentKind) -> Result<LoadedDocument, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| LoadError::Read(path.to_path_buf(), e))?;
    let content_hash = hex::encode(Sha256::digest(&bytes));
    let units: Vec<TextUnit> = match kind {
        DocumentKind::Pdf => extract_pdf_pages(path, &bytes)?
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| TextUnit::new(path, UnitLocation::Page(i as u32 + 1), text))
            .collect(),
        DocumentKind::Spreadsheet => extract_sheets(path, bytes)?
            .into_iter()
            .map(|(name, text)| TextUnit::new(path, UnitLocation::Sheet(name), text))
            .collect(),
    };
    Ok(LoadedDocument {
        path: path.to_path_buf(),
        content_hash,
        units,
    })
}

/// One string per page. pdf-extract can panic on malformed input, so the panic
/// is turned into a load error for this file only.
fn extract_pdf_pages(path: &Path, bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(LoadError::Pdf(path.to_path_buf(), e.to_string())),
        Err(_) => Err(LoadError::Pdf(
            path.to_path_buf(),
            "parser panicked on malformed input".to_string(),
        )),
    }
}

/// (sheet name, rendered text) for every sheet with at least one non-empty cell.
fn extract_sheets(path: &Path, bytes: Vec<u8>) -> Result<Vec<(String, String)>, LoadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| LoadError::Spreadsheet(path.to_path_buf(), e.to_string()))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| LoadError::Spreadsheet(path.to_path_buf(), e.to_string()))?;
        if let Some(text) = render_sheet(&name, &range) {
            sheets.push((name, text));
        }
    }
    Ok(sheets)
}

/// Sheet name on the first line, then one tab-separated line per non-empty row.
fn render_sheet(name: &str, range: &Range<Data>) -> Option<String> {
    let rows: Vec<String> = range
        .rows()
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| {
            row.iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("\t")
                .trim_end()
                .to_string()
        })
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(format!("Sheet: {name}\n{}", rows.join("\n")))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("PDF extraction failed for {0}: {1}")]
    Pdf(PathBuf, String),
    #[error("spreadsheet extraction failed for {0}: {1}")]
    Spreadsheet(PathBuf, String),
}
