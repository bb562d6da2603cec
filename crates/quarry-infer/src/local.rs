use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Completion, CompletionProvider, EmbeddingProvider, InferError, SYSTEM_PROMPT, endpoint_url,
    extract_embedding_vector, extract_text, token_count,
};

// Ollama and look-alike servers disagree on response shapes.
const EMBEDDING_PATHS: [&str; 4] = [
    "/embedding",
    "/data/0/embedding",
    "/embeddings/0",
    "/embeddings/0/embedding",
];
const TEXT_PATHS: [&str; 3] = ["/response", "/message/content", "/choices/0/message/content"];
const TOKEN_PATHS: [&str; 2] = ["/prompt_eval_count", "/eval_count"];

#[derive(Debug, Clone)]
pub struct LocalEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl LocalEmbeddingProvider {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferError> {
        let body = json!({
            "model": self.model,
            "prompt": text
        });

        let response: Value = self
            .client
            .post(endpoint_url(&self.endpoint, "api/embeddings"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_embedding_vector(&response, &EMBEDDING_PATHS)
    }
}

#[derive(Debug, Clone)]
pub struct LocalCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl LocalCompletionProvider {
    pub fn new(endpoint: String, model: String, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            temperature,
        }
    }
}

#[async_trait]
impl CompletionProvider for LocalCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<Completion, InferError> {
        let body = json!({
            "model": self.model,
            "system": SYSTEM_PROMPT,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature }
        });

        let response: Value = self
            .client
            .post(endpoint_url(&self.endpoint, "api/generate"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Completion {
            text: extract_text(&response, &TEXT_PATHS)?,
            total_tokens: token_count(&response, &TOKEN_PATHS),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ollama_shapes_are_recognized() {
        let embedding = json!({ "embedding": [0.1, 0.2, 0.3] });
        assert_eq!(
            extract_embedding_vector(&embedding, &EMBEDDING_PATHS).expect("vector").len(),
            3
        );

        let batched = json!({ "embeddings": [[1.0, 0.0]] });
        assert_eq!(
            extract_embedding_vector(&batched, &EMBEDDING_PATHS).expect("batched"),
            vec![1.0, 0.0]
        );

        let generated = json!({
            "response": "ANSWER: ok",
            "prompt_eval_count": 30,
            "eval_count": 12
        });
        assert_eq!(extract_text(&generated, &TEXT_PATHS).expect("text"), "ANSWER: ok");
        assert_eq!(token_count(&generated, &TOKEN_PATHS), 42);
    }
}
