//! All backend logic independent of how the app is run (CLI or HTTP server).
//!
//! PDFs and spreadsheets are loaded from folders, embedded in batches into a
//! persisted [`VectorIndex`], and questions are answered by retrieving the
//! closest passages and asking a chat model over them.

pub mod answer;
pub mod app_data;
pub mod config;
pub mod documents;
pub mod ingest;
pub mod providers;
pub mod server;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use answer::{needs_fallback, Answer, AnswerError, AnswerOrigin, Answerer};
pub use app_data::app_data_dir;
pub use config::{load_config, save_config, Config, ConfigError, ModelEndpoint, Provider};
pub use documents::{
    DocumentKind, DocumentLoader, LoadError, LoadOutcome, LoadedDocument, TextUnit, UnitLocation,
};
pub use ingest::{IngestError, IngestPhase, IngestPipeline, IngestReport};
pub use providers::{build_chat, build_embedder, ChatModel, ChatOptions, Embedder, ProviderError};
pub use store::{IndexError, SearchHit, VectorIndex};
pub use watcher::{watch_folder, watch_folders, FolderWatch, WatchError};

/// Open the persisted index and both model clients for answering.
///
/// Fails with a configuration error if either endpoint is incomplete or if no
/// index has been built yet.
pub fn open_answerer(config: &Config) -> Result<Answerer, SetupError> {
    config.validate_for_answer()?;
    let index = VectorIndex::load(&config.paths.index_dir)?
        .ok_or_else(|| SetupError::NoIndex(config.paths.index_dir.clone()))?;
    tracing::info!(entries = index.len(), "loaded index");
    let embedder = build_embedder(&config.embedding)?;
    let chat = build_chat(&config.chat)?;
    Ok(Answerer::new(index, embedder, chat, config.answer.clone()))
}

/// Build the ingestion pipeline from config.
pub fn open_pipeline(config: &Config) -> Result<IngestPipeline, SetupError> {
    config.validate_for_ingest()?;
    let embedder = build_embedder(&config.embedding)?;
    Ok(IngestPipeline::new(config.paths.clone(), config.ingest.clone(), embedder))
}

/// Startup failures: fatal for the command that hit them.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no index at {0}; run `zeus ingest` first")]
    NoIndex(std::path::PathBuf),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answering_without_index_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.index_dir = dir.path().join("index");
        for endpoint in [&mut config.embedding, &mut config.chat] {
            endpoint.deployment = Some("d".into());
            endpoint.api_key = Some("k".into());
            endpoint.endpoint = Some("https://example.com".into());
            endpoint.api_version = Some("2024-02-01".into());
        }
        assert!(matches!(open_answerer(&config), Err(SetupError::NoIndex(_))));
    }

    #[test]
    fn missing_credentials_are_reported_before_anything_else() {
        let config = Config::default();
        assert!(matches!(open_answerer(&config), Err(SetupError::Config(ConfigError::Missing(_)))));
        assert!(matches!(open_pipeline(&config), Err(SetupError::Config(ConfigError::Missing(_)))));
    }
}
