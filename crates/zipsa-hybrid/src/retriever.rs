use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use zipsa_core::config::RetrievalConfig;
use zipsa_core::filter::Filter;
use zipsa_core::traits::{DenseSearcher, EmbeddingProvider, SparseSearcher};
use zipsa_core::types::{Document, RankedResult, SearchMode, SearchRequest};
use zipsa_core::Result;
use zipsa_text::Tokenizer;

use crate::fusion::fuse;

/// Public entry point of retrieval: keyword and vector search run side by
/// side and their rankings are merged with RRF.
///
/// A failing or slow branch contributes an empty list; only contract
/// violations (bad request, bad filter, dimension mismatch) reach the caller.
pub struct HybridRetriever<S, D> {
    tokenizer: Arc<Tokenizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    sparse: S,
    dense: D,
    config: RetrievalConfig,
}

impl<S, D> HybridRetriever<S, D>
where
    S: SparseSearcher,
    D: DenseSearcher,
{
    pub fn new(tokenizer: Arc<Tokenizer>, embedder: Arc<dyn EmbeddingProvider>, sparse: S, dense: D, config: RetrievalConfig) -> Self {
        Self { tokenizer, embedder, sparse, dense, config }
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RankedResult>> {
        request.validate()?;
        let filter = request.to_filter(&self.config.general_sentinel)?;
        let limit = request.limit.min(self.config.max_limit);
        if limit < request.limit {
            debug!(requested = request.limit, limit, "limit clamped");
        }
        if request.text.trim().is_empty() {
            debug!("blank query");
            return Ok(Vec::new());
        }
        let candidates = limit.saturating_mul(self.config.over_fetch);
        let tokenized = self.tokenizer.tokenize(&request.text);
        debug!(query = %request.text, %tokenized, ?filter, candidates, mode = ?request.mode, "hybrid search");

        // Dropping this future drops both branches; nothing outlives the call.
        let (vector_hits, keyword_hits) = match request.mode {
            SearchMode::Hybrid => tokio::join!(
                self.dense_branch(&request.text, &filter, candidates),
                self.sparse_branch(&tokenized, &filter, candidates),
            ),
            SearchMode::VectorOnly => (self.dense_branch(&request.text, &filter, candidates).await, Ok(Vec::new())),
            SearchMode::KeywordOnly => (Ok(Vec::new()), self.sparse_branch(&tokenized, &filter, candidates).await),
        };
        let (vector_hits, keyword_hits) = (vector_hits?, keyword_hits?);
        let (n_vector, n_keyword) = (vector_hits.len(), keyword_hits.len());

        let results = fuse(vector_hits, keyword_hits, limit, self.config.rrf_k);
        info!(vector = n_vector, keyword = n_keyword, returned = results.len(), "retrieval complete");
        Ok(results)
    }

    async fn sparse_branch(&self, tokenized: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>> {
        if tokenized.is_empty() {
            debug!("no keyword tokens; skipping keyword search");
            return Ok(Vec::new());
        }
        let budget = self.config.sparse_timeout();
        degrade("keyword", budget, timeout(budget, self.sparse.search(tokenized, filter, limit)).await)
    }

    async fn dense_branch(&self, text: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>> {
        let run = async {
            let vector = self.embedder.embed_query(text).await?;
            self.dense.search(&vector, filter, limit).await
        };
        let budget = self.config.dense_timeout();
        degrade("vector", budget, timeout(budget, run).await)
    }
}

/// Turn a recoverable branch failure into an empty hit list.
fn degrade(branch: &str, budget: Duration, outcome: std::result::Result<Result<Vec<Document>>, tokio::time::error::Elapsed>) -> Result<Vec<Document>> {
    match outcome {
        Ok(Ok(docs)) => {
            debug!(branch, hits = docs.len(), "branch finished");
            Ok(docs)
        }
        Ok(Err(e)) if e.is_recoverable() => {
            warn!(branch, error = %e, "branch failed; continuing without it");
            Ok(Vec::new())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(branch, timeout_ms = budget.as_millis() as u64, "branch timed out; continuing without it");
            Ok(Vec::new())
        }
    }
}
