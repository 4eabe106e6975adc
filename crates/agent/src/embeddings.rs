use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use ridematch_core::config::{AppConfig, EmbeddingProvider};
use ridematch_core::errors::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{ensure_success, http_client, transport_error, trim_base_url, CompletionError};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    Upstream(#[from] CompletionError),
    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

pub fn embedder_from_config(config: &AppConfig) -> Result<Arc<dyn Embedder>, ApplicationError> {
    let timeout_secs = config.llm.timeout_secs;
    match config.effective_embedding_provider() {
        EmbeddingProvider::Dummy => Ok(Arc::new(HashingEmbedder::new(config.embeddings.dimensions))),
        EmbeddingProvider::Ollama => {
            let base_url = config.llm.base_url.clone().ok_or_else(|| {
                ApplicationError::Configuration(
                    "llm.base_url is required for ollama embeddings".to_string(),
                )
            })?;
            Ok(Arc::new(OllamaEmbedder {
                client: http_client(timeout_secs)?,
                base_url: trim_base_url(&base_url),
                model: config.embeddings.model.clone(),
                timeout_secs,
            }))
        }
        EmbeddingProvider::OpenAi => {
            let api_key = config.llm.api_key.clone().ok_or_else(|| {
                ApplicationError::Configuration(
                    "llm.api_key is required for openai embeddings".to_string(),
                )
            })?;
            let base_url =
                config.llm.base_url.clone().unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string());
            Ok(Arc::new(OpenAiEmbedder {
                client: http_client(timeout_secs)?,
                base_url: trim_base_url(&base_url),
                model: config.embeddings.model.clone(),
                api_key,
                timeout_secs,
            }))
        }
    }
}

/// Deterministic, network-free embeddings: each lowercase token is hashed into
/// a signed bucket and the resulting vector is L2-normalized.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let lowered = text.to_lowercase();

        for token in lowered.split(|ch: char| !ch.is_alphanumeric()).filter(|token| !token.is_empty())
        {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut bucket_bytes = [0_u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut vectors = Vec::with_capacity(texts.len());

        for text in texts {
            let request = OllamaEmbeddingRequest { model: &self.model, prompt: text };
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|error| transport_error(error, self.timeout_secs))?;
            let body: OllamaEmbeddingResponse = ensure_success(response)
                .await?
                .json()
                .await
                .map_err(|error| CompletionError::Decode(error.to_string()))?;
            vectors.push(body.embedding);
        }

        Ok(vectors)
    }
}

pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let request = OpenAiEmbeddingRequest { model: &self.model, input: texts };
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;
        let mut body: OpenAiEmbeddingResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| CompletionError::Decode(error.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: body.data.len(),
            });
        }
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{Embedder, HashingEmbedder};

    fn cosine(left: &[f32], right: &[f32]) -> f32 {
        left.iter().zip(right).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let first = embedder.embed_text("Long travel suspension on an adventure bike");
        let second = embedder.embed_text("Long travel suspension on an adventure bike");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        let norm = cosine(&first, &first);
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn shared_vocabulary_scores_higher_than_disjoint_text() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_text("adventure suspension");
        let related = embedder.embed_text("adventure bike with plush suspension");
        let unrelated = embedder.embed_text("chrome cruiser paint job");

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let vector = HashingEmbedder::new(16).embed_text("   ");
        assert!(vector.iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn batch_embedding_preserves_order() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["touring".to_string(), "enduro".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap_or_default();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], embedder.embed_text("touring"));
        assert_eq!(vectors[1], embedder.embed_text("enduro"));
    }
}
