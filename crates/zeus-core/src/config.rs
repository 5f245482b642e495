//! Explicit configuration: model endpoints, folders and pipeline tunables.
//!
//! Resolution order (later wins): built-in defaults, `config.toml`, a `.env`
//! file, then process environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_data;

const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_BATCH_SIZE: usize = 30;
pub const DEFAULT_BATCH_DELAY_SECS: u64 = 10;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MIN_ANSWER_CHARS: usize = 20;
pub const DEFAULT_FALLBACK_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_FALLBACK_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: ModelEndpoint,
    pub chat: ModelEndpoint,
    pub paths: Paths,
    pub ingest: IngestSettings,
    pub answer: AnswerSettings,
}

/// Which backend serves a model endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Azure OpenAI deployments (`/openai/deployments/{name}/...`).
    #[default]
    Azure,
    /// A local Ollama server. `api_key` and `api_version` are ignored.
    Ollama,
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(Provider::Azure),
            "ollama" => Ok(Provider::Ollama),
            other => Err(format!("unknown provider `{other}`")),
        }
    }
}

/// Connection details for one model (embedding or chat).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEndpoint {
    pub provider: Provider,
    /// Azure deployment name, or the Ollama model name.
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub api_version: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelEndpoint {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            deployment: None,
            api_key: None,
            endpoint: None,
            api_version: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ModelEndpoint {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Checks that every value the provider needs is present and non-empty.
    /// `section` is `embedding` or `chat`, used to name the missing field.
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        let env_suffix = section.to_ascii_uppercase();
        let require = |value: &Option<String>, field: &str, var: String| {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                Err(ConfigError::Missing(format!("{section}.{field} ({var})")))
            } else {
                Ok(())
            }
        };
        require(&self.deployment, "deployment", format!("DEPLOYMENT_NAME_{env_suffix}"))?;
        if self.provider == Provider::Azure {
            require(&self.api_key, "api_key", format!("OPENAI_API_KEY_{env_suffix}"))?;
            require(&self.endpoint, "endpoint", format!("AZURE_OPENAI_ENDPOINT_{env_suffix}"))?;
            require(&self.api_version, "api_version", format!("OPENAI_API_VERSION_{env_suffix}"))?;
        }
        Ok(())
    }
}

/// The three folders the pipeline works with, plus the index directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// PDFs waiting to be embedded.
    pub pending_dir: PathBuf,
    /// Where PDFs go once their vectors are persisted.
    pub embedded_dir: PathBuf,
    /// Spreadsheet exports; scanned on every run, never moved.
    pub spreadsheet_dir: PathBuf,
    /// Persisted vector index.
    pub index_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        let base = app_data::base_dir();
        Self {
            pending_dir: base.join("pending"),
            embedded_dir: base.join("embedded"),
            spreadsheet_dir: base.join("spreadsheets"),
            index_dir: base.join("index"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Maximum number of texts per embedding call.
    pub batch_size: usize,
    /// Pause between embedding batches (quota throttle).
    pub batch_delay_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_secs: DEFAULT_BATCH_DELAY_SECS,
        }
    }
}

impl IngestSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerSettings {
    /// Passages retrieved per question.
    pub top_k: usize,
    /// Retrieval answers shorter than this (trimmed) trigger the fallback.
    pub min_answer_chars: usize,
    pub fallback_temperature: f32,
    pub fallback_max_tokens: u32,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_answer_chars: DEFAULT_MIN_ANSWER_CHARS,
            fallback_temperature: DEFAULT_FALLBACK_TEMPERATURE,
            fallback_max_tokens: DEFAULT_FALLBACK_MAX_TOKENS,
        }
    }
}

impl Config {
    /// Everything `zeus ingest` needs: an embedding endpoint and a usable batch size.
    pub fn validate_for_ingest(&self) -> Result<(), ConfigError> {
        self.embedding.validate("embedding")?;
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Invalid("ingest.batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Everything the answering path needs: both endpoints and a usable top-k.
    pub fn validate_for_answer(&self) -> Result<(), ConfigError> {
        self.embedding.validate("embedding")?;
        self.chat.validate("chat")?;
        if self.answer.top_k == 0 {
            return Err(ConfigError::Invalid("answer.top_k must be at least 1".into()));
        }
        Ok(())
    }

    /// Copy with API keys masked, for printing.
    pub fn redacted(&self) -> Config {
        let mut c = self.clone();
        for endpoint in [&mut c.embedding, &mut c.chat] {
            if endpoint.api_key.is_some() {
                endpoint.api_key = Some("***".to_string());
            }
        }
        c
    }

    /// Applies environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        for (section, endpoint) in [("EMBEDDING", &mut self.embedding), ("CHAT", &mut self.chat)] {
            if let Some(v) = get(&format!("ZEUS_{section}_PROVIDER")) {
                endpoint.provider = v
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv(format!("ZEUS_{section}_PROVIDER"), v))?;
            }
            if let Some(v) = get(&format!("DEPLOYMENT_NAME_{section}")) {
                endpoint.deployment = Some(v);
            }
            if let Some(v) = get(&format!("OPENAI_API_KEY_{section}")) {
                endpoint.api_key = Some(v);
            }
            if let Some(v) = get(&format!("AZURE_OPENAI_ENDPOINT_{section}")) {
                endpoint.endpoint = Some(v);
            }
            if let Some(v) = get(&format!("OPENAI_API_VERSION_{section}")) {
                endpoint.api_version = Some(v);
            }
            if let Some(v) = get(&format!("ZEUS_{section}_TIMEOUT_SECS")) {
                endpoint.timeout_secs = parse_env(&format!("ZEUS_{section}_TIMEOUT_SECS"), v)?;
            }
        }

        if let Some(v) = get("ZEUS_PENDING_DIR") {
            self.paths.pending_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ZEUS_EMBEDDED_DIR") {
            self.paths.embedded_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ZEUS_SPREADSHEET_DIR") {
            self.paths.spreadsheet_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ZEUS_INDEX_DIR") {
            self.paths.index_dir = PathBuf::from(v);
        }

        if let Some(v) = get("ZEUS_BATCH_SIZE") {
            self.ingest.batch_size = parse_env("ZEUS_BATCH_SIZE", v)?;
        }
        if let Some(v) = get("ZEUS_BATCH_DELAY_SECS") {
            self.ingest.batch_delay_secs = parse_env("ZEUS_BATCH_DELAY_SECS", v)?;
        }
        if let Some(v) = get("ZEUS_TOP_K") {
            self.answer.top_k = parse_env("ZEUS_TOP_K", v)?;
        }
        if let Some(v) = get("ZEUS_MIN_ANSWER_CHARS") {
            self.answer.min_answer_chars = parse_env("ZEUS_MIN_ANSWER_CHARS", v)?;
        }
        if let Some(v) = get("ZEUS_FALLBACK_TEMPERATURE") {
            self.answer.fallback_temperature = parse_env("ZEUS_FALLBACK_TEMPERATURE", v)?;
        }
        if let Some(v) = get("ZEUS_FALLBACK_MAX_TOKENS") {
            self.answer.fallback_max_tokens = parse_env("ZEUS_FALLBACK_MAX_TOKENS", v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv(name.to_string(), value))
}

/// Default location of the config file, if an app data directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    app_data::app_data_dir().map(|d| d.join(CONFIG_FILENAME))
}

/// Read a config file. Only the file; no `.env` or environment overrides.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&s).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Resolve the full configuration.
///
/// An explicit `path` must exist. Without one, `config.toml` in the app data
/// directory is used when present; otherwise defaults apply. A `.env` file in
/// the working directory is loaded before environment overrides are read.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(p) => read_config_file(&p)?,
            None => Config::default(),
        },
    };
    match dotenvy::dotenv() {
        Ok(p) => tracing::debug!(path = %p.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("ignoring unreadable .env: {e}"),
    }
    config.apply_env(|k| std::env::var(k).ok())?;
    Ok(config)
}

/// Save config to `path`, or to the app data directory when `path` is `None`.
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().ok_or(ConfigError::NoDataDir)?,
    };
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)?;
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("missing required setting {0}")]
    Missing(String),
    #[error("invalid setting: {0}")]
    Invalid(String),
    #[error("invalid value for {0}: {1:?}")]
    InvalidEnv(String, String),
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
}
