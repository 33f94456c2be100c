use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use zipsa_core::traits::EmbeddingProvider;
use zipsa_core::Result;

use crate::normalize::finalize;

/// Deterministic bag-of-tokens embedder. Texts sharing tokens land close to
/// each other, which is enough for tests and model-free runs.
pub struct HashProvider {
    dim: usize,
    id: String,
}

impl HashProvider {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hash:xxh64:d{dim}") }
    }

    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
        if tokens.is_empty() {
            tokens.push("");
        }
        let mut v = vec![0f32; self.dim];
        for (i, token) in tokens.iter().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += 0.5 + val + (i % 3) as f32 * 0.01;
        }
        finalize(v, self.dim)
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn provider_id(&self) -> &str { &self.id }

    fn dimension(&self) -> usize { self.dim }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> { self.embed_sync(text) }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_sync(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[tokio::test]
    async fn shapes_and_determinism() {
        let embedder = HashProvider::new(64);
        let texts = vec!["hello world".to_string(), "hello world".to_string()];
        let embs = embedder.embed_documents(&texts).await.expect("embed");
        assert_eq!(embs[0].len(), 64);
        let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
        assert_eq!(embs[0], embs[1]);
        assert_eq!(embedder.embed_query("hello world").await.expect("query"), embs[0]);
    }

    #[tokio::test]
    async fn shared_tokens_are_closer() {
        let embedder = HashProvider::new(256);
        let q = embedder.embed_query("고양이 사료").await.expect("q");
        let near = embedder.embed_query("고양이 사료 추천").await.expect("near");
        let far = embedder.embed_query("강아지 산책 코스").await.expect("far");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[tokio::test]
    async fn empty_text_still_yields_a_unit_vector() {
        let v = HashProvider::new(16).embed_query("").await.expect("empty");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-3);
    }
}
