use anyhow::{anyhow, Context};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use zipsa_core::traits::EmbeddingProvider;
use zipsa_core::{Result, RetrievalError};

use crate::device::select_device;
use crate::normalize::finalize;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

// e5 models are trained with these role prefixes.
const QUERY_PREFIX: &str = "query: ";
const PASSAGE_PREFIX: &str = "passage: ";

/// multilingual-e5 (BERT) running in-process on candle.
///
/// `model_dir` must hold `tokenizer.json`, `config.json` and either
/// `model.safetensors` or `pytorch_model.bin`.
pub struct LocalProvider {
    inner: Arc<Inner>,
    id: String,
}

struct Inner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl LocalProvider {
    pub fn load(model_dir: &Path, dim: usize, max_len: usize) -> anyhow::Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&config_text)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))?;
        if usize::try_from(hidden_size)? != dim {
            anyhow::bail!("model hidden size {hidden_size} does not match configured dimension {dim}");
        }
        let config: BertConfig = serde_json::from_str(&config_text)?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let name = model_dir.file_name().map_or_else(|| "model".to_string(), |n| n.to_string_lossy().into_owned());
        let id = format!("local:{name}:d{dim}");
        info!(provider = %id, "embedding model loaded");
        Ok(Self { inner: Arc::new(Inner { model, tokenizer, device, dim, max_len }), id })
    }

    /// A blocking task cannot be aborted, so dropping this future (a
    /// retrieval timeout, say) only stops the work before its next text.
    async fn embed_prefixed(&self, prefix: &'static str, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let inner = Arc::clone(&self.inner);
        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancelled));
        tokio::task::spawn_blocking(move || {
            map_until_cancelled(&texts, &cancelled, |t| inner.embed_one(&format!("{prefix}{t}")))
        })
        .await
        .map_err(|e| RetrievalError::EmbeddingFailure(e.to_string()))?
    }
}

struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn map_until_cancelled<T, U>(items: &[T], cancelled: &AtomicBool, mut f: impl FnMut(&T) -> Result<U>) -> Result<Vec<U>> {
    items
        .iter()
        .map(|item| {
            if cancelled.load(Ordering::Relaxed) {
                return Err(RetrievalError::EmbeddingFailure("embedding cancelled".to_string()));
            }
            f(item)
        })
        .collect()
}

impl Inner {
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let raw = self.forward(text).map_err(|e| RetrievalError::EmbeddingFailure(e.to_string()))?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            debug!(?elapsed, chars = text.chars().count(), "slow embedding");
        }
        finalize(raw, self.dim)
    }

    fn forward(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let (input_ids, token_type_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> anyhow::Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle).with_context(|| format!("reading {}", pickle.display()))?;
    weights
        .into_iter()
        .map(|(name, t)| -> anyhow::Result<(String, Tensor)> { Ok((name, t.to_device(device)?)) })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn provider_id(&self) -> &str { &self.id }

    fn dimension(&self) -> usize { self.inner.dim }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_prefixed(QUERY_PREFIX, vec![text.to_string()]).await?;
        out.pop().ok_or_else(|| RetrievalError::EmbeddingFailure("no vector for query".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_prefixed(PASSAGE_PREFIX, texts.to_vec()).await
    }
}
