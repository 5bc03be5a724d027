use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTINGS_PATH: &str = "data/real_estate_listings.csv";
const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "chatgpt-4o-latest";
/// Higher-variance output for the rewrite
const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.7;
/// Near-deterministic output for query construction
const DEFAULT_SELF_QUERY_TEMPERATURE: f32 = 0.2;
const DEFAULT_TOP_K: usize = 4;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// fastembed model on this machine
    #[default]
    Local,
    OpenAI,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// fastembed model name, used by the local provider
    #[serde(default = "default_local_model")]
    pub local_model: String,

    /// Model name for the openai provider
    #[serde(default = "default_openai_embedding_model")]
    pub openai_model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Unset keeps the HTTP client's default
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            local_model: default_local_model(),
            openai_model: default_openai_embedding_model(),
            api_base: default_api_base(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            request_timeout_secs: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            api_base: default_api_base(),
            temperature: DEFAULT_GENERATION_TEMPERATURE,
            request_timeout_secs: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity [-1.0, 1.0]; unset returns the best
    /// matches whatever their score
    #[serde(default)]
    pub min_score: Option<f32>,

    /// Let the chat model extract metadata filters from the preference
    #[serde(default)]
    pub self_query: bool,

    #[serde(default = "default_self_query_temperature")]
    pub self_query_temperature: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: None,
            self_query: false,
            self_query_temperature: DEFAULT_SELF_QUERY_TEMPERATURE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Keep embeddings in `vectors.bin` under the base path
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { persist: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

fn default_local_model() -> String {
    crate::semantic::DEFAULT_MODEL.to_string()
}

fn default_openai_embedding_model() -> String {
    DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_generation_temperature() -> f32 {
    DEFAULT_GENERATION_TEMPERATURE
}

fn default_self_query_temperature() -> f32 {
    DEFAULT_SELF_QUERY_TEMPERATURE
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_true() -> bool {
    true
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_listings_path() -> PathBuf {
    PathBuf::from(DEFAULT_LISTINGS_PATH)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listings_path")]
    pub listings_path: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listings_path: default_listings_path(),
            server: ServerConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            index: IndexConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        for (name, temperature) in [
            ("generation.temperature", self.generation.temperature),
            (
                "retrieval.self_query_temperature",
                self.retrieval.self_query_temperature,
            ),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                bail!("{name} must be between 0.0 and 2.0, got {temperature}");
            }
        }

        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be greater than 0");
        }

        if let Some(min_score) = self.retrieval.min_score {
            if !(-1.0..=1.0).contains(&min_score) {
                bail!("retrieval.min_score must be between -1.0 and 1.0, got {min_score}");
            }
        }

        if self.embeddings.download_timeout_secs == 0 {
            bail!("embeddings.download_timeout_secs must be greater than 0");
        }

        for (name, timeout) in [
            (
                "embeddings.request_timeout_secs",
                self.embeddings.request_timeout_secs,
            ),
            (
                "generation.request_timeout_secs",
                self.generation.request_timeout_secs,
            ),
        ] {
            if timeout == Some(0) {
                bail!("{name} must be greater than 0 when set");
            }
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults when it does not
    /// exist yet.
    pub fn load_with<P: AsRef<Path>>(base_path: P) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("creating {}", base_path.display()))?;

        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            log::info!("writing default config to {}", path.display());
            write_atomic(&path, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("config {} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        write_atomic(&self.base_path.join(CONFIG_FILE), config_str.as_bytes())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let temp_path = path.with_extension("yaml.tmp");
    std::fs::write(&temp_path, data)
        .with_context(|| format!("writing {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();

        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.retrieval.self_query_temperature, 0.2);
        assert_eq!(config.embeddings.provider, EmbeddingProvider::Local);
        assert!(!config.retrieval.self_query);
        assert!(config.index.persist);
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn test_partial_config_gets_defaults_and_is_resaved() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "embeddings:\n  provider: openai\nretrieval:\n  top_k: 2\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();

        assert_eq!(config.embeddings.provider, EmbeddingProvider::OpenAI);
        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(config.server.addr, DEFAULT_ADDR);

        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("generation:"));
        assert_eq!(Config::load_with(tmp.path()).unwrap(), config);
    }

    #[test]
    fn test_rejects_out_of_range_temperature() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "generation:\n  temperature: 3.5\n",
        )
        .unwrap();

        let err = Config::load_with(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("generation.temperature"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "retrieval:\n  top_k: 0\n").unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "generation:\n  request_timeout_secs: 0\n",
        )
        .unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "retrieval: [unclosed").unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }
}
