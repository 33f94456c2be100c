//! zipsa-embed
//!
//! Embedding providers behind [`zipsa_core::traits::EmbeddingProvider`]:
//! a local multilingual-e5 model on candle, an OpenAI-compatible HTTP
//! endpoint, and a deterministic hash embedder for tests and offline runs.
//! Every provider hands back L2-normalized vectors of its declared
//! dimension or an error; see [`normalize::finalize`].

pub mod device;
pub mod hash;
pub mod local;
pub mod normalize;
pub mod pool;
pub mod remote;
pub mod tokenize;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use zipsa_core::config::EmbeddingBackendConfig;
use zipsa_core::traits::EmbeddingProvider;

pub use hash::HashProvider;
pub use local::LocalProvider;
pub use normalize::{finalize, l2_normalize};
pub use pool::masked_mean_l2;
pub use remote::RemoteProvider;

/// Build the provider selected in configuration. Relative model paths are
/// resolved against `base_dir`.
pub fn provider_from_config(config: &EmbeddingBackendConfig, base_dir: &Path) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config {
        EmbeddingBackendConfig::Local { model_dir, dimension, max_len } => {
            let dir = zipsa_core::config::resolve_with_base(base_dir, model_dir);
            Arc::new(LocalProvider::load(&dir, *dimension, *max_len)?)
        }
        EmbeddingBackendConfig::Remote { endpoint, model, dimension, api_key, timeout_secs, send_dimensions } => {
            let key = api_key.clone().or_else(|| std::env::var("OPENAI_API_KEY").ok());
            Arc::new(RemoteProvider::new(endpoint, model, *dimension, key, *timeout_secs)?.send_dimensions(*send_dimensions))
        }
        EmbeddingBackendConfig::Hash { dimension } => Arc::new(HashProvider::new(*dimension)),
    };
    tracing::info!(provider = provider.provider_id(), dimension = provider.dimension(), "embedding provider ready");
    Ok(provider)
}
