use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "COLD_MAIL_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "cold_mail.toml";
const ENV_PREFIX: &str = "COLD_MAIL_";

pub const DEFAULT_COLLECTION_NAME: &str = "portfolio";
pub const DEFAULT_RESULT_LIMIT: usize = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "qdrant")]
    Qdrant,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    #[serde(rename = "fastembed")]
    FastEmbed,
    /// Deterministic feature hashing; needs no model download.
    #[serde(rename = "hashing")]
    Hashing,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PortfolioConfig {
    /// CSV file with the `Techstack,Links` header used to bootstrap the store.
    pub table_path: PathBuf,
    /// Directory holding the on-disk collection (local backend).
    pub store_dir: PathBuf,
    pub collection_name: String,
    pub result_limit: usize,
    pub backend: StoreBackend,
    pub query_timeout_secs: u64,
    pub embed_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("resource/my_portfolio.csv"),
            store_dir: PathBuf::from("vectorstore"),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            result_limit: DEFAULT_RESULT_LIMIT,
            backend: StoreBackend::Local,
            query_timeout_secs: 10,
            embed_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl PortfolioConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    pub hashing_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let default_cache_dir = ProjectDirs::from("dev", "cold-mail", "cold-mail")
            .map(|dirs| dirs.cache_dir().join("models"));
        Self {
            provider: EmbeddingProvider::FastEmbed,
            cache_dir: default_cache_dir,
            hashing_dimension: 384,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended.
    pub api_base: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    /// Page text beyond this many characters is shortened before extraction.
    pub max_input_chars: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-8b-8192".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.0,
            max_input_chars: 4000,
            max_retries: 3,
            retry_backoff_ms: 1000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OutreachConfig {
    /// Default sender context used when a request does not carry its own.
    #[serde(default)]
    pub context: Option<String>,
    pub user_agent: String,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            context: None,
            user_agent: concat!("cold-mail/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub outreach: OutreachConfig,
}

pub fn load_config() -> Result<AppConfig> {
    let config_path_env = std::env::var(CONFIG_PATH_ENV).ok();
    let config_path = config_path_env
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    if let Some(ref env_path) = config_path_env {
        if !std::path::Path::new(env_path).exists() {
            return Err(anyhow::anyhow!(
                "Config file not found at {}: {}",
                CONFIG_PATH_ENV,
                env_path
            ));
        }
        log::info!("{} is set: {}", CONFIG_PATH_ENV, env_path);
    } else {
        log::info!("{} not set, falling back to default: {}", CONFIG_PATH_ENV, config_path);
    }

    let figment = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: AppConfig = figment.extract().context("Failed to extract AppConfig")?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
    let portfolio = &config.portfolio;
    if portfolio.collection_name.trim().is_empty() {
        return Err(anyhow::anyhow!("portfolio.collection_name cannot be empty"));
    }
    if portfolio.result_limit == 0 {
        return Err(anyhow::anyhow!("portfolio.result_limit must be greater than zero"));
    }
    if portfolio.table_path.as_os_str().is_empty() {
        return Err(anyhow::anyhow!("portfolio.table_path cannot be empty"));
    }
    if portfolio.store_dir.as_os_str().is_empty() {
        return Err(anyhow::anyhow!("portfolio.store_dir cannot be empty"));
    }
    if config.embedding.hashing_dimension == 0 {
        return Err(anyhow::anyhow!("embedding.hashing_dimension must be greater than zero"));
    }
    if config.llm.model.trim().is_empty() {
        return Err(anyhow::anyhow!("llm.model cannot be empty"));
    }
    Ok(())
}
