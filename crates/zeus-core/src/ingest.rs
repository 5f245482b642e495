//! Ingestion pipeline: load → batch → embed → add → save, then archive PDFs.
//!
//! The index is saved after every batch, so a crash loses at most one batch.
//! PDFs are moved out of the pending folder only after the last batch has been
//! saved; until then they stay put and the next run picks them up again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{IngestSettings, Paths};
use crate::documents::{DocumentLoader, LoadedDocument, TextUnit};
use crate::providers::{Embedder, ProviderError};
use crate::store::{IndexError, VectorIndex};

/// Where a run currently is. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    NoIndex,
    IndexLoadedOrNew,
    BatchProcessing,
    FilesMoved,
    Done,
}

/// What a run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Embedding calls made (one per batch).
    pub batches: usize,
    /// Text units embedded.
    pub units: usize,
    /// Times the index was written to disk.
    pub saves: usize,
    /// Files left alone because the ledger already has their exact content.
    pub skipped: Vec<String>,
    /// PDFs moved to the embedded folder, at their new location.
    pub moved: Vec<PathBuf>,
    pub move_failures: usize,
}

pub struct IngestPipeline {
    paths: Paths,
    settings: IngestSettings,
    embedder: Arc<dyn Embedder>,
}

impl IngestPipeline {
    pub fn new(paths: Paths, settings: IngestSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            paths,
            settings,
            embedder,
        }
    }

    /// Run the whole pipeline over the pending and spreadsheet folders.
    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        let pdfs = DocumentLoader::pdfs(&self.paths.pending_dir);
        let sheets = DocumentLoader::spreadsheets(&self.paths.spreadsheet_dir);
        let (pdf_docs, sheet_docs) = tokio::task::spawn_blocking(move || {
            let pdf_docs: Vec<LoadedDocument> = pdfs.documents().collect();
            let sheet_docs: Vec<LoadedDocument> = sheets.documents().collect();
            (pdf_docs, sheet_docs)
        })
        .await
        .map_err(|e| IngestError::Loader(e.to_string()))?;

        let archive: Vec<PathBuf> = pdf_docs.iter().map(|d| d.path.clone()).collect();
        let mut documents = pdf_docs;
        documents.extend(sheet_docs);
        self.ingest_documents(documents, archive).await
    }

    /// Embed `documents` into the index and then move every path in `archive`
    /// to the embedded folder.
    pub async fn ingest_documents(
        &self,
        documents: Vec<LoadedDocument>,
        archive: Vec<PathBuf>,
    ) -> Result<IngestReport, IngestError> {
        let index_dir = &self.paths.index_dir;
        let mut index = VectorIndex::load(index_dir)?;
        enter(if index.is_some() {
            IngestPhase::IndexLoadedOrNew
        } else {
            IngestPhase::NoIndex
        });

        let mut report = IngestReport::default();
        let mut units: Vec<TextUnit> = Vec::new();
        // (number of units that must be saved, file name, content hash)
        let mut completions: Vec<(usize, String, String)> = Vec::new();
        let mut pruned = 0usize;
        for doc in documents {
            let name = doc.file_name();
            if let Some(existing) = index.as_mut() {
                if existing.is_ingested(&name, &doc.content_hash) {
                    tracing::info!(file = %name, "already ingested, skipping");
                    report.skipped.push(name);
                    continue;
                }
                // A new version replaces the whole document, including pages
                // or sheets it no longer has.
                let removed = existing.remove_file(&name);
                if removed > 0 {
                    tracing::info!(file = %name, removed, "replacing previous version");
                    pruned += removed;
                }
            }
            units.extend(doc.units);
            completions.push((units.len(), name, doc.content_hash));
        }

        let batch_size = self.settings.batch_size.max(1);
        let total = units.len();
        let batch_count = total.div_ceil(batch_size);
        if batch_count > 0 {
            enter(IngestPhase::BatchProcessing);
        }
        let mut completions = completions.into_iter().peekable();
        let mut remaining = units.into_iter();
        let mut done = 0usize;
        for b in 0..batch_count {
            let batch: Vec<TextUnit> = remaining.by_ref().take(batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|u| u.text.clone()).collect();
            tracing::info!(batch = b + 1, of = batch_count, texts = texts.len(), "embedding batch");
            let vectors = self.embedder.embed_batch(&texts).await?;
            report.batches += 1;
            done += batch.len();

            let mut current = match index.take() {
                Some(mut existing) => {
                    existing.add(batch, vectors)?;
                    existing
                }
                None => VectorIndex::create_from(batch, vectors)?,
            };
            while let Some((_, name, hash)) = completions.next_if(|(end, _, _)| *end <= done) {
                current.record_ingested(name, hash);
            }
            current.save(index_dir)?;
            report.saves += 1;
            index = Some(current);

            if b + 1 < batch_count {
                self.throttle().await;
            }
        }
        report.units = done;
        if batch_count == 0 && pruned > 0 {
            if let Some(current) = index.as_mut() {
                for (_, name, hash) in completions {
                    current.record_ingested(name, hash);
                }
                current.save(index_dir)?;
                report.saves += 1;
            }
        }

        if !archive.is_empty() {
            self.archive(&archive, &mut report);
            enter(IngestPhase::FilesMoved);
        }
        enter(IngestPhase::Done);
        tracing::info!(
            batches = report.batches,
            units = report.units,
            moved = report.moved.len(),
            skipped = report.skipped.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    async fn throttle(&self) {
        let delay = self.settings.batch_delay();
        if delay > Duration::ZERO {
            tracing::debug!(secs = delay.as_secs(), "pausing before next batch");
            tokio::time::sleep(delay).await;
        }
    }

    /// Move files to the embedded folder. Failures are logged, not fatal:
    /// the vectors are already saved and the ledger keeps the file from being
    /// embedded twice.
    fn archive(&self, files: &[PathBuf], report: &mut IngestReport) {
        let dest_dir = &self.paths.embedded_dir;
        if let Err(e) = std::fs::create_dir_all(dest_dir) {
            tracing::warn!(dir = %dest_dir.display(), "cannot create embedded folder: {e}");
            report.move_failures += files.len();
            return;
        }
        for src in files {
            let Some(name) = src.file_name() else {
                continue;
            };
            let dst = dest_dir.join(name);
            match move_file(src, &dst) {
                Ok(()) => {
                    tracing::info!(file = %name.to_string_lossy(), "moved to embedded folder");
                    report.moved.push(dst);
                }
                Err(e) => {
                    tracing::warn!(file = %src.display(), "failed to move: {e}");
                    report.move_failures += 1;
                }
            }
        }
    }
}

fn enter(phase: IngestPhase) {
    tracing::debug!(?phase, "ingest phase");
}

/// Rename, falling back to copy + delete across filesystems.
fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(src, dst)?;
            std::fs::remove_file(src)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("document loading failed: {0}")]
    Loader(String),
    #[error("embedding error: {0}")]
    Provider(#[from] ProviderError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}
