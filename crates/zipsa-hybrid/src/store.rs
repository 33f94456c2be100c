//! Wiring of one knowledge store from configuration: tokenizer resources,
//! embedding provider, tantivy index and LanceDB table.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use zipsa_core::config::{AppConfig, Config, RetrievalConfig};
use zipsa_core::traits::EmbeddingProvider;
use zipsa_core::types::Document;
use zipsa_embed::provider_from_config;
use zipsa_text::{ResourcePaths, SparseIndex, TantivySparseSearcher, Tokenizer, TokenizerConfig};
use zipsa_vector::{DenseIndex, LanceDenseSearcher};

use crate::retriever::HybridRetriever;

pub type StoreRetriever = HybridRetriever<TantivySparseSearcher, LanceDenseSearcher>;

const EMBED_BATCH: usize = 32;

pub struct Store {
    pub tokenizer: Arc<Tokenizer>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub sparse: SparseIndex,
    pub dense: DenseIndex,
    pub retrieval: RetrievalConfig,
}

/// Build the query/document tokenizer from the resource files named in `config`.
pub fn load_tokenizer(config: &Config) -> Result<Tokenizer> {
    let app: AppConfig = config.app()?;
    let dictionary = app.tokenizer.dictionary.as_deref().map(|p| config.resolve(p));
    let stopwords = app.tokenizer.stopwords.as_deref().map(|p| config.resolve(p));
    let synonyms = app.tokenizer.synonyms.as_deref().map(|p| config.resolve(p));
    let resources = TokenizerConfig::load(&ResourcePaths {
        dictionary: dictionary.as_deref(),
        stopwords: stopwords.as_deref(),
        synonyms: synonyms.as_deref(),
    });
    Ok(Tokenizer::new(Arc::new(resources)))
}

/// Open (creating on first use) the store described by `config`.
pub async fn open_store(config: &Config) -> Result<Store> {
    let app: AppConfig = config.app()?;
    let tokenizer = Arc::new(load_tokenizer(config)?);

    let embedder = provider_from_config(&app.embedding, config.base_dir())?;

    let sparse_dir = config.resolve(&app.store.sparse_index_dir);
    let sparse = SparseIndex::open_or_create(&sparse_dir, &app.store.traits)?;

    let dense_uri = config.resolve(&app.store.dense_uri);
    let dense = DenseIndex::open(&dense_uri.to_string_lossy(), &app.store.table, embedder.provider_id(), embedder.dimension(), &app.store.traits).await?;

    info!(sparse = %sparse_dir.display(), dense = %dense_uri.display(), table = %app.store.table, "store opened");
    Ok(Store { tokenizer, embedder, sparse, dense, retrieval: app.retrieval })
}

impl Store {
    pub fn retriever(&self) -> Result<StoreRetriever> {
        Ok(HybridRetriever::new(
            Arc::clone(&self.tokenizer),
            Arc::clone(&self.embedder),
            self.sparse.searcher()?,
            self.dense.searcher(),
            self.retrieval.clone(),
        ))
    }

    /// Tokenize, embed and upsert `docs` into both indexes. `on_batch` is
    /// called with the number of documents finished after each batch.
    ///
    /// Each batch is embedded before anything is written and the sparse
    /// index commits right after the dense upsert, so an error leaves both
    /// indexes holding the same completed batches.
    pub async fn index_documents(&self, mut docs: Vec<Document>, mut on_batch: impl FnMut(usize)) -> Result<usize> {
        let mut writer = self.sparse.writer()?;
        let dense = self.dense.writer();
        for batch in docs.chunks_mut(EMBED_BATCH) {
            for doc in batch.iter_mut() {
                doc.tokenized_text = self.tokenizer.tokenize(&doc.raw_text);
            }
            let texts: Vec<String> = batch.iter().map(|d| d.raw_text.clone()).collect();
            let vectors = self.embedder.embed_documents(&texts).await?;
            anyhow::ensure!(vectors.len() == batch.len(), "embedder returned {} vectors for {} texts", vectors.len(), batch.len());
            for (doc, vector) in batch.iter_mut().zip(vectors) {
                doc.embedding = vector;
            }
            dense.upsert(batch).await?;
            writer.upsert_all(batch)?;
            writer.commit()?;
            on_batch(batch.len());
        }
        info!(documents = docs.len(), "indexing complete");
        Ok(docs.len())
    }
}
