//! Vector index for embedded text units: similarity search plus save/load to a directory.
//!
//! The directory holds a single `index.json`. Saving writes a temporary file
//! next to it and renames it into place, so a reader never sees a half-written
//! index. The ingestion ledger lives in the same file, which makes "file
//! recorded" and "file's vectors persisted" the same event.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::documents::{TextUnit, UnitLocation};

const INDEX_FILENAME: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

/// A text unit with its embedding, stored for similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedUnit {
    pub id: String,
    pub text: String,
    pub source: PathBuf,
    pub location: UnitLocation,
    /// Normalized embedding vector (unit length for cosine similarity via dot product).
    embedding: Vec<f32>,
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub source: PathBuf,
    pub location: UnitLocation,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    dimension: usize,
    items: Vec<IndexedUnit>,
    /// File name → content hash of documents whose units are all in `items`.
    ledger: BTreeMap<String, String>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
            ..Self::default()
        }
    }

    /// Build a fresh index from the first batch.
    pub fn create_from(
        units: Vec<TextUnit>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new();
        index.add(units, embeddings)?;
        Ok(index)
    }

    /// Load the index persisted in `dir`. `Ok(None)` means nothing has been saved there yet.
    pub fn load(dir: &Path) -> Result<Option<Self>, IndexError> {
        let path = dir.join(INDEX_FILENAME);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|e| IndexError::Read(path.clone(), e))?;
        let mut index: VectorIndex =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::Decode(path.clone(), e))?;
        if index.version != FORMAT_VERSION {
            return Err(IndexError::Version(index.version));
        }
        index.rebuild_positions();
        Ok(Some(index))
    }

    /// Serialize the whole index into `dir`, replacing any previous contents.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir).map_err(|e| IndexError::Write(dir.to_path_buf(), e))?;
        let path = dir.join(INDEX_FILENAME);
        let tmp = dir.join(format!("{INDEX_FILENAME}.tmp"));
        let bytes = serde_json::to_vec(self).map_err(IndexError::Encode)?;
        {
            let mut file =
                std::fs::File::create(&tmp).map_err(|e| IndexError::Write(tmp.clone(), e))?;
            file.write_all(&bytes)
                .and_then(|_| file.sync_all())
                .map_err(|e| IndexError::Write(tmp.clone(), e))?;
        }
        std::fs::rename(&tmp, &path).map_err(|e| IndexError::Write(path.clone(), e))?;
        tracing::debug!(path = %path.display(), entries = self.items.len(), "saved index");
        Ok(())
    }

    /// Add units with their embeddings. An id already present is replaced in
    /// place; new ids are appended in order.
    pub fn add(
        &mut self,
        units: Vec<TextUnit>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), IndexError> {
        if units.len() != embeddings.len() {
            return Err(IndexError::Count {
                units: units.len(),
                embeddings: embeddings.len(),
            });
        }
        // Validate the whole batch before touching the index.
        let mut dimension = self.dimension;
        for e in &embeddings {
            if dimension == 0 {
                dimension = e.len();
            }
            if e.is_empty() || e.len() != dimension {
                return Err(IndexError::Dimension {
                    expected: dimension,
                    got: e.len(),
                });
            }
        }
        self.dimension = dimension;

        for (unit, embedding) in units.into_iter().zip(embeddings) {
            let item = IndexedUnit {
                id: unit.id,
                text: unit.text,
                source: unit.source,
                location: unit.location,
                embedding: normalize(&embedding),
            };
            match self.positions.get(&item.id) {
                Some(&pos) => self.items[pos] = item,
                None => {
                    self.positions.insert(item.id.clone(), self.items.len());
                    self.items.push(item);
                }
            }
        }
        Ok(())
    }

    /// The `k` entries most similar to `query_embedding`, best first.
    pub fn query(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.items.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query_embedding.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                got: query_embedding.len(),
            });
        }
        let q_norm = normalize(query_embedding);
        let mut scored: Vec<(usize, f32)> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (i, dot(&q_norm, &item.embedding)))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let item = &self.items[i];
                SearchHit {
                    id: item.id.clone(),
                    text: item.text.clone(),
                    source: item.source.clone(),
                    location: item.location.clone(),
                    score,
                }
            })
            .collect())
    }

    /// Drop every unit that came from `file_name`, and its ledger entry.
    /// Returns the number of units removed.
    pub fn remove_file(&mut self, file_name: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|item| {
            item.source
                .file_name()
                .map_or(true, |n| n.to_string_lossy() != file_name)
        });
        self.ledger.remove(file_name);
        let removed = before - self.items.len();
        if removed > 0 {
            self.rebuild_positions();
        }
        removed
    }

    /// Record that every unit of `file_name` (at `content_hash`) is in the index.
    pub fn record_ingested(
        &mut self,
        file_name: impl Into<String>,
        content_hash: impl Into<String>,
    ) {
        self.ledger.insert(file_name.into(), content_hash.into());
    }

    /// True if this exact file content has already been ingested.
    pub fn is_ingested(&self, file_name: &str, content_hash: &str) -> bool {
        self.ledger.get(file_name).map_or(false, |h| h == content_hash)
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    /// Number of indexed units.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Embedding dimension, or 0 for an empty index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    (0..n).map(|i| a[i] * b[i]).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("{units} units but {embeddings} embeddings")]
    Count { units: usize, embeddings: usize },
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
    #[error("unsupported index format version {0}")]
    Version(u32),
    #[error("failed to read index {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("corrupt index {0}: {1}")]
    Decode(PathBuf, serde_json::Error),
    #[error("failed to encode index: {0}")]
    Encode(serde_json::Error),
    #[error("failed to write index {0}: {1}")]
    Write(PathBuf, std::io::Error),
}
