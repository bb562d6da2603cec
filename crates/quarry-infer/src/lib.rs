use std::env;

use async_trait::async_trait;
use quarry_config::{
    DEFAULT_COMPLETION_MODEL, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_LOCAL_ENDPOINT, DEFAULT_OPENAI_ENDPOINT, PLACEHOLDER_API_KEY, ProviderKind,
    QuarryConfig,
};
use quarry_core::truncate_chars;
use serde_json::Value;
use thiserror::Error;

mod local;
mod openai;

pub use local::{LocalCompletionProvider, LocalEmbeddingProvider};
pub use openai::{OpenAiCompletionProvider, OpenAiEmbeddingProvider};

/// Remote embedding requests only see this many characters of input.
pub const EMBEDDING_INPUT_MAX_CHARS: usize = 8000;
pub const OFFLINE_PROVIDER_NAME: &str = "offline";

const SYSTEM_PROMPT: &str = "You are an expert software engineer who explains codebases \
    accurately, citing the files, functions and commits you were given.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u32,
}

/// CLI-level overrides. `provider` applies to both services; `model` and
/// `endpoint` only to completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InferenceOverrides {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Error)]
pub enum InferError {
    #[error("missing API key in {0}")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
    #[error("invalid embedding response: {0}")]
    InvalidEmbeddingResponse(String),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError>;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, InferError>;
}

/// Explicitly constructed embedding and completion services, handed to the
/// pipeline and the retrieval engine by reference.
pub struct InferenceServices {
    embedder: Option<Box<dyn EmbeddingProvider>>,
    completer: Option<Box<dyn CompletionProvider>>,
    dimension: usize,
    embedding_provider_name: String,
    completion_provider_name: String,
}

impl InferenceServices {
    /// A `dimension` of 0 means the configured default.
    pub fn offline(dimension: usize) -> Self {
        Self {
            embedder: None,
            completer: None,
            dimension: if dimension == 0 {
                DEFAULT_EMBEDDING_DIMENSION
            } else {
                dimension
            },
            embedding_provider_name: OFFLINE_PROVIDER_NAME.to_owned(),
            completion_provider_name: OFFLINE_PROVIDER_NAME.to_owned(),
        }
    }

    pub fn with_embedder(
        mut self,
        provider: Box<dyn EmbeddingProvider>,
        name: impl Into<String>,
    ) -> Self {
        self.embedder = Some(provider);
        self.embedding_provider_name = name.into();
        self
    }

    pub fn with_completer(
        mut self,
        provider: Box<dyn CompletionProvider>,
        name: impl Into<String>,
    ) -> Self {
        self.completer = Some(provider);
        self.completion_provider_name = name.into();
        self
    }

    pub fn from_config(
        config: &QuarryConfig,
        overrides: &InferenceOverrides,
    ) -> Result<Self, InferError> {
        let mut services = Self::offline(config.embeddings.effective_dimension());

        let embedding_kind = overrides.provider.unwrap_or(config.embeddings.provider);
        let embedding_key_env = config.embeddings.api_key_env.as_str();
        let embedding_model = config
            .embeddings
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_owned());
        match select_backend(embedding_kind, read_api_key(embedding_key_env), embedding_key_env)? {
            Backend::Offline => {}
            Backend::OpenAi(api_key) => {
                let endpoint = config
                    .embeddings
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_owned());
                services = services.with_embedder(
                    Box::new(OpenAiEmbeddingProvider::new(endpoint, embedding_model, api_key)),
                    ProviderKind::Openai.as_str(),
                );
            }
            Backend::Local => {
                let endpoint = config
                    .embeddings
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOCAL_ENDPOINT.to_owned());
                services = services.with_embedder(
                    Box::new(LocalEmbeddingProvider::new(endpoint, embedding_model)),
                    ProviderKind::Local.as_str(),
                );
            }
        }

        let completion_kind = overrides.provider.unwrap_or(config.inference.provider);
        let completion_key_env = config.inference.api_key_env.as_str();
        let completion_model =
            first_non_empty(overrides.model.clone(), config.inference.model.clone())
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_owned());
        let completion_endpoint =
            first_non_empty(overrides.endpoint.clone(), config.inference.endpoint.clone());
        let temperature = config.inference.temperature;
        match select_backend(
            completion_kind,
            read_api_key(completion_key_env),
            completion_key_env,
        )? {
            Backend::Offline => {}
            Backend::OpenAi(api_key) => {
                let endpoint =
                    completion_endpoint.unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_owned());
                services = services.with_completer(
                    Box::new(OpenAiCompletionProvider::new(
                        endpoint,
                        completion_model,
                        api_key,
                        temperature,
                    )),
                    ProviderKind::Openai.as_str(),
                );
            }
            Backend::Local => {
                let endpoint =
                    completion_endpoint.unwrap_or_else(|| DEFAULT_LOCAL_ENDPOINT.to_owned());
                services = services.with_completer(
                    Box::new(LocalCompletionProvider::new(
                        endpoint,
                        completion_model,
                        temperature,
                    )),
                    ProviderKind::Local.as_str(),
                );
            }
        }

        tracing::debug!(
            embeddings = %services.embedding_provider_name,
            completion = %services.completion_provider_name,
            "inference services ready"
        );
        Ok(services)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedding_provider_name(&self) -> &str {
        &self.embedding_provider_name
    }

    pub fn completion_provider_name(&self) -> &str {
        &self.completion_provider_name
    }

    pub fn completion_available(&self) -> bool {
        self.completer.is_some()
    }

    /// Never fails: a missing or failing provider yields the deterministic
    /// fallback vector for the full text.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let Some(embedder) = &self.embedder else {
            return fallback_embedding(text, self.dimension);
        };

        let input = truncate_chars(text, EMBEDDING_INPUT_MAX_CHARS);
        match embedder.embed_text(input).await {
            Ok(vector) if !vector.is_empty() => vector,
            Ok(_) => {
                tracing::warn!(
                    provider = %self.embedding_provider_name,
                    "empty embedding, using fallback"
                );
                fallback_embedding(text, self.dimension)
            }
            Err(err) => {
                tracing::warn!(
                    provider = %self.embedding_provider_name,
                    error = %err,
                    "embedding request failed, using fallback"
                );
                fallback_embedding(text, self.dimension)
            }
        }
    }

    /// `Ok(None)` when no completion service is configured.
    pub async fn complete(&self, prompt: &str) -> Result<Option<Completion>, InferError> {
        match &self.completer {
            Some(completer) => completer.complete(prompt).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Deterministic pseudo-embedding derived from UTF-16 code units, L2-normalized.
pub fn fallback_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dimension = dimension.max(1);
    let mut embedding = vec![0.0f64; dimension];

    for (position, unit) in text.encode_utf16().enumerate() {
        let code = f64::from(unit);
        let index = (usize::from(unit) * (position + 1)) % dimension;
        embedding[index] += (code * 0.01).sin() * 0.1;
    }

    let magnitude = embedding.iter().map(|value| value * value).sum::<f64>().sqrt();
    let magnitude = if magnitude > 0.0 { magnitude } else { 1.0 };
    embedding
        .into_iter()
        .map(|value| (value / magnitude) as f32)
        .collect()
}

/// 0.0 for mismatched lengths, empty input or a zero-magnitude vector.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_left = 0.0f32;
    let mut norm_right = 0.0f32;
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        norm_left += a * a;
        norm_right += b * b;
    }

    if norm_left <= f32::EPSILON || norm_right <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_left.sqrt() * norm_right.sqrt())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    Offline,
    OpenAi(String),
    Local,
}

fn select_backend(
    kind: ProviderKind,
    api_key: Option<String>,
    api_key_env: &str,
) -> Result<Backend, InferError> {
    match kind {
        ProviderKind::Offline => Ok(Backend::Offline),
        ProviderKind::Local => Ok(Backend::Local),
        ProviderKind::Auto => Ok(api_key.map_or(Backend::Offline, Backend::OpenAi)),
        ProviderKind::Openai => api_key
            .map(Backend::OpenAi)
            .ok_or_else(|| InferError::MissingApiKey(api_key_env.to_owned())),
    }
}

fn read_api_key(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty() && value != PLACEHOLDER_API_KEY)
}

fn first_non_empty(left: Option<String>, right: Option<String>) -> Option<String> {
    normalize_optional(left).or_else(|| normalize_optional(right))
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn value_to_embedding_vector(value: &Value) -> Option<Vec<f32>> {
    let values = value.as_array()?;
    if values.is_empty() {
        return None;
    }

    let mut embedding = Vec::with_capacity(values.len());
    for item in values {
        let number = item.as_f64()?;
        if !number.is_finite() {
            return None;
        }
        embedding.push(number as f32);
    }
    Some(embedding)
}

fn extract_embedding_vector(
    response: &Value,
    candidate_paths: &[&str],
) -> Result<Vec<f32>, InferError> {
    for path in candidate_paths {
        if let Some(value) = response.pointer(path)
            && let Some(vector) = value_to_embedding_vector(value)
        {
            return Ok(vector);
        }
    }

    Err(InferError::InvalidEmbeddingResponse(
        "missing embedding vector in response body".to_owned(),
    ))
}

fn extract_text(response: &Value, candidate_paths: &[&str]) -> Result<String, InferError> {
    for path in candidate_paths {
        if let Some(text) = response.pointer(path).and_then(Value::as_str) {
            return Ok(text.to_owned());
        }
    }

    Err(InferError::InvalidResponse(
        "missing completion text in response body".to_owned(),
    ))
}

fn token_count(response: &Value, paths: &[&str]) -> u32 {
    paths
        .iter()
        .filter_map(|path| response.pointer(path).and_then(Value::as_u64))
        .sum::<u64>()
        .min(u64::from(u32::MAX)) as u32
}
