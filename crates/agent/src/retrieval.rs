use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use ridematch_core::domain::document::{RetrievedDocument, META_BRAND, META_MODEL, META_YEAR};
use ridematch_core::errors::ApplicationError;
use thiserror::Error;

use crate::embeddings::{Embedder, EmbeddingError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl StoreError {
    pub fn into_application(self) -> ApplicationError {
        ApplicationError::transient("retrieval", self.to_string())
    }
}

/// Ranked similarity search. Returning fewer than `k` documents, or none, is
/// a valid answer rather than an error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, StoreError>;
}

struct IndexedDocument {
    document: RetrievedDocument,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexedDocument>,
}

impl InMemoryStore {
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        documents: Vec<RetrievedDocument>,
    ) -> Result<Self, StoreError> {
        let texts = documents.iter().map(embedding_text).collect::<Vec<_>>();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(StoreError::Embedding(EmbeddingError::CountMismatch {
                expected: documents.len(),
                actual: vectors.len(),
            }));
        }

        let entries = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| IndexedDocument { document, vector })
            .collect();
        Ok(Self { embedder, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, StoreError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut scored = Vec::with_capacity(self.entries.len());
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.vector.len() != query_vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: entry.vector.len(),
                    actual: query_vector.len(),
                });
            }
            scored.push((cosine_similarity(&query_vector, &entry.vector), position));
        }

        // Stable on ties: earlier catalog entries rank first.
        scored.sort_by(|left, right| {
            right.0.partial_cmp(&left.0).unwrap_or(Ordering::Equal).then(left.1.cmp(&right.1))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, position)| self.entries[position].document.clone())
            .collect())
    }
}

fn embedding_text(document: &RetrievedDocument) -> String {
    let heading = [META_BRAND, META_MODEL, META_YEAR]
        .into_iter()
        .filter_map(|key| document.meta(key))
        .collect::<Vec<_>>()
        .join(" ");
    if heading.is_empty() {
        document.raw_text.clone()
    } else {
        format!("{heading}\n{}", document.raw_text)
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ridematch_core::domain::document::{RetrievedDocument, META_BRAND, META_MODEL};

    use super::{DocumentStore, InMemoryStore};
    use crate::embeddings::HashingEmbedder;

    fn documents() -> Vec<RetrievedDocument> {
        vec![
            RetrievedDocument::new("1", "Chrome cruiser with loud pipes and a low seat")
                .with_metadata(META_BRAND, "Harley-Davidson")
                .with_metadata(META_MODEL, "Street Bob"),
            RetrievedDocument::new("2", "Adventure bike with long travel suspension for gravel")
                .with_metadata(META_BRAND, "KTM")
                .with_metadata(META_MODEL, "890 Adventure"),
            RetrievedDocument::new("3", "Sport touring bike with heated grips"),
        ]
    }

    async fn store() -> Result<InMemoryStore, String> {
        InMemoryStore::build(Arc::new(HashingEmbedder::new(256)), documents())
            .await
            .map_err(|error| error.to_string())
    }

    #[tokio::test]
    async fn search_ranks_most_similar_document_first() -> Result<(), String> {
        let store = store().await?;
        let results = store
            .search("adventure suspension gravel", 2)
            .await
            .map_err(|error| error.to_string())?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id.0, "2");
        Ok(())
    }

    #[tokio::test]
    async fn search_returns_at_most_k_and_empty_is_valid() -> Result<(), String> {
        let store = store().await?;
        let all = store.search("bike", 10).await.map_err(|error| error.to_string())?;
        assert_eq!(all.len(), 3);

        let none = store.search("bike", 0).await.map_err(|error| error.to_string())?;
        assert!(none.is_empty());

        let empty = InMemoryStore::build(Arc::new(HashingEmbedder::new(16)), Vec::new())
            .await
            .map_err(|error| error.to_string())?;
        assert!(empty.is_empty());
        assert!(empty.search("anything", 5).await.map_err(|error| error.to_string())?.is_empty());
        Ok(())
    }
}
