use async_trait::async_trait;

use crate::error::Result;
use crate::filter::Filter;
use crate::types::Document;

/// Maps text to fixed-dimension, L2-normalized vectors.
///
/// Implementations validate every vector at the boundary: a wrong length is
/// `DimensionMismatch`, anything else that goes wrong is `EmbeddingFailure`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `local:e5-small:d384`).
    fn provider_id(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Keyword search over `tokenized_text`, best match first.
#[async_trait]
pub trait SparseSearcher: Send + Sync {
    async fn search(&self, tokenized_query: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>>;
}

/// Nearest-neighbour search over embeddings, best match first.
///
/// `limit` is the number of candidates wanted; the caller already applied
/// any over-fetch factor.
#[async_trait]
pub trait DenseSearcher: Send + Sync {
    async fn search(&self, query_vector: &[f32], filter: &Filter, limit: usize) -> Result<Vec<Document>>;
}
