use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const QUARRY_DIR_NAME: &str = ".quarry";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STORE_FILE_NAME: &str = "quarry.sqlite";
pub const DEFAULT_OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const PLACEHOLDER_API_KEY: &str = "your-openai-api-key-here";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://127.0.0.1:11434";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_COMMITS: usize = 500;
pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_COMMIT_EMBEDDING_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Auto,
    Offline,
    Openai,
    Local,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Offline => "offline",
            Self::Openai => "openai",
            Self::Local => "local",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "offline" => Ok(Self::Offline),
            "openai" => Ok(Self::Openai),
            "local" => Ok(Self::Local),
            other => Err(format!(
                "invalid provider '{other}', expected one of: auto, offline, openai, local"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QuarryConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Completion service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Auto,
            model: None,
            endpoint: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
        }
    }
}

/// Embedding service settings. `dimension` also sizes the offline fallback vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Auto,
            model: None,
            endpoint: None,
            api_key_env: default_api_key_env(),
            dimension: default_dimension(),
            concurrency: default_concurrency(),
        }
    }
}

impl EmbeddingsConfig {
    /// Vector length actually produced; 0 falls back to the default.
    pub fn effective_dimension(&self) -> usize {
        if self.dimension == 0 {
            DEFAULT_EMBEDDING_DIMENSION
        } else {
            self.dimension
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_commit_embedding_window")]
    pub commit_embedding_window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_commits: default_max_commits(),
            max_depth: default_max_depth(),
            max_file_bytes: default_max_file_bytes(),
            commit_embedding_window: default_commit_embedding_window(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn quarry_home(working_dir: impl AsRef<Path>) -> PathBuf {
    working_dir.as_ref().join(QUARRY_DIR_NAME)
}

pub fn config_path(home: impl AsRef<Path>) -> PathBuf {
    home.as_ref().join(CONFIG_FILE_NAME)
}

pub fn store_path(home: impl AsRef<Path>) -> PathBuf {
    home.as_ref().join(STORE_FILE_NAME)
}

pub fn load_config(home: impl AsRef<Path>) -> Result<QuarryConfig, ConfigError> {
    let path = config_path(home);
    if !path.exists() {
        return Ok(QuarryConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: QuarryConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

/// Loads `<home>/config.toml`, writing the defaults first when it is missing.
pub fn ensure_config(home: impl AsRef<Path>) -> Result<QuarryConfig, ConfigError> {
    let home = home.as_ref();
    fs::create_dir_all(home)?;

    let path = config_path(home);
    if path.exists() {
        return load_config(home);
    }

    let config = QuarryConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &QuarryConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.embeddings.dimension == 0 {
        warnings.push(ConfigWarning {
            code: "embeddings_dimension_zero",
            message: format!(
                "embeddings.dimension is 0; using {DEFAULT_EMBEDDING_DIMENSION}"
            ),
        });
    }
    if config.embeddings.concurrency == 0 {
        warnings.push(ConfigWarning {
            code: "embeddings_concurrency_zero",
            message: "embeddings.concurrency is 0; requests run one at a time".to_owned(),
        });
    }
    if config.analysis.max_commits == 0 {
        warnings.push(ConfigWarning {
            code: "analysis_max_commits_zero",
            message: "analysis.max_commits is 0; commit history will be empty".to_owned(),
        });
    }
    if config.inference.provider == ProviderKind::Local && config.inference.endpoint.is_none() {
        warnings.push(ConfigWarning {
            code: "inference_local_endpoint_default",
            message: format!(
                "inference.provider is local without an endpoint; using {DEFAULT_LOCAL_ENDPOINT}"
            ),
        });
    }
    if config.embeddings.provider == ProviderKind::Local && config.embeddings.endpoint.is_none()
    {
        warnings.push(ConfigWarning {
            code: "embeddings_local_endpoint_default",
            message: format!(
                "embeddings.provider is local without an endpoint; using {DEFAULT_LOCAL_ENDPOINT}"
            ),
        });
    }
    if !(0.0..=2.0).contains(&config.inference.temperature) {
        warnings.push(ConfigWarning {
            code: "inference_temperature_range",
            message: format!(
                "inference.temperature {} is outside 0.0..=2.0",
                config.inference.temperature
            ),
        });
    }

    warnings
}

fn default_api_key_env() -> String {
    DEFAULT_OPENAI_API_KEY_ENV.to_owned()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_concurrency() -> usize {
    DEFAULT_EMBEDDING_CONCURRENCY
}

fn default_max_commits() -> usize {
    DEFAULT_MAX_COMMITS
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

fn default_commit_embedding_window() -> usize {
    DEFAULT_COMMIT_EMBEDDING_WINDOW
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_key_env(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        default_api_key_env()
    } else {
        value.to_owned()
    }
}

fn normalize_config(mut config: QuarryConfig) -> QuarryConfig {
    config.inference.model = normalize_optional(config.inference.model.take());
    config.inference.endpoint = normalize_optional(config.inference.endpoint.take());
    config.inference.api_key_env = normalize_key_env(&config.inference.api_key_env);

    config.embeddings.model = normalize_optional(config.embeddings.model.take());
    config.embeddings.endpoint = normalize_optional(config.embeddings.endpoint.take());
    config.embeddings.api_key_env = normalize_key_env(&config.embeddings.api_key_env);

    config
}
