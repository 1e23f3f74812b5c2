use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama3.2";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_COLLECTION: &str = "notes";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_METRICS_RETENTION_DAYS: u32 = 30;

const APP_DIR: &str = "studysphere";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join(APP_DIR))
    }

    pub fn runtime_dir() -> PathBuf {
        dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }

    pub fn socket_path(&self) -> PathBuf {
        Self::runtime_dir().join("daemon.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        Self::runtime_dir().join("daemon.pid")
    }

    pub fn metrics_db_path() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("metrics.db"))
    }

    /// Directory holding the persisted index.
    pub fn index_dir(&self) -> Option<PathBuf> {
        self.storage
            .index_dir
            .clone()
            .or_else(|| Self::data_dir().map(|p| p.join("index")))
    }

    /// Load from the config file, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("LLM_MODEL") {
            self.generation.model = model;
        }
        if let Some(url) = non_empty("OLLAMA_API_URL") {
            self.generation.url = url.clone();
            self.embedding.url = url;
        }
        if let Some(url) = non_empty("EMBEDDING_URL") {
            self.embedding.url = url;
        }
        if let Some(model) = non_empty("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dir) = non_empty("INDEX_DIR") {
            self.storage.index_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let indexing = &self.indexing;
        if indexing.chunk_overlap == 0 || indexing.chunk_overlap >= indexing.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunk_overlap must satisfy 0 < overlap < chunk_size (got {} / {})",
                indexing.chunk_overlap, indexing.chunk_size
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding batch_size must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "temperature must be between 0.0 and 2.0 (got {})",
                self.generation.temperature
            )));
        }
        if self.retrieval.default_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval default_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set a single value by dotted key, e.g. `generation.model`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
            value
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("invalid value for {key}: {value}")))
        }

        match key {
            "embedding.url" => self.embedding.url = value.to_string(),
            "embedding.model" => self.embedding.model = value.to_string(),
            "embedding.dimension" => self.embedding.dimension = parse(key, value)?,
            "embedding.timeout_secs" => self.embedding.timeout_secs = parse(key, value)?,
            "embedding.batch_size" => self.embedding.batch_size = parse(key, value)?,
            "generation.url" => self.generation.url = value.to_string(),
            "generation.model" => self.generation.model = value.to_string(),
            "generation.temperature" => self.generation.temperature = parse(key, value)?,
            "generation.max_output_tokens" => {
                self.generation.max_output_tokens = parse(key, value)?
            }
            "generation.timeout_secs" => self.generation.timeout_secs = parse(key, value)?,
            "indexing.chunk_size" => self.indexing.chunk_size = parse(key, value)?,
            "indexing.chunk_overlap" => self.indexing.chunk_overlap = parse(key, value)?,
            "retrieval.default_k" => self.retrieval.default_k = parse(key, value)?,
            "storage.index_dir" => self.storage.index_dir = Some(PathBuf::from(value)),
            "storage.collection" => self.storage.collection = value.to_string(),
            "daemon.idle_timeout_secs" => self.daemon.idle_timeout_secs = parse(key, value)?,
            "daemon.auto_start" => self.daemon.auto_start = parse(key, value)?,
            "metrics.enabled" => self.metrics.enabled = parse(key, value)?,
            "metrics.retention_days" => self.metrics.retention_days = parse(key, value)?,
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown config key: {key}"
                )));
            }
        }
        self.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    16
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    800
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_chunk_size() -> u32 {
    800
}

fn default_chunk_overlap() -> u32 {
    150
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: u32,
}

fn default_k() -> u32 {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overrides the default `<data_dir>/index`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,

    /// Index-instance identifier within the store
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            collection: default_collection(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default)]
    pub auto_start: bool,
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            auto_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    DEFAULT_METRICS_RETENTION_DAYS
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            retention_days: default_retention_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.generation.url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.generation.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.indexing.chunk_size, 800);
        assert_eq!(config.indexing.chunk_overlap, 150);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [generation]
            model = "mistral"
            "#,
        )
        .unwrap();
        assert_eq!(config.generation.model, "mistral");
        assert_eq!(config.generation.max_output_tokens, 800);
        assert_eq!(config.storage.collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LLM_MODEL", "phi3"),
            ("OLLAMA_API_URL", "http://gpu-box:11434"),
            ("EMBEDDING_MODEL", ""),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.generation.model, "phi3");
        assert_eq!(config.generation.url, "http://gpu-box:11434");
        assert_eq!(config.embedding.url, "http://gpu-box:11434");
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_validate_rejects_bad_overlap() {
        let mut config = Config::default();
        config.indexing.chunk_overlap = 800;
        assert!(config.validate().is_err());
        config.indexing.chunk_overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("generation.temperature", "0.7").unwrap();
        assert!((config.generation.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.set_value("generation.temperature", "hot").is_err());
        assert!(config.set_value("nope.key", "1").is_err());
        assert!(config.set_value("indexing.chunk_overlap", "900").is_err());
    }
}
