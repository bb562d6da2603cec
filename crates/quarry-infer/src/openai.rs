use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Completion, CompletionProvider, EmbeddingProvider, InferError, SYSTEM_PROMPT, endpoint_url,
    extract_embedding_vector, extract_text, token_count,
};

/// OpenAI-compatible `/embeddings` client.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError> {
        let body = json!({
            "model": self.model,
            "input": text
        });

        let response: Value = self
            .client
            .post(endpoint_url(&self.endpoint, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_embedding_vector(&response, &["/data/0/embedding"])
    }
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiCompletionProvider {
    pub fn new(endpoint: String, model: String, api_key: String, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            api_key,
            temperature,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<Completion, InferError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": self.temperature
        });

        let response: Value = self
            .client
            .post(endpoint_url(&self.endpoint, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Completion {
            text: extract_text(&response, &["/choices/0/message/content"])?,
            total_tokens: token_count(&response, &["/usage/total_tokens"]),
        })
    }
}
