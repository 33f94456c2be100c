use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use zipsa_core::traits::EmbeddingProvider;
use zipsa_core::{Result, RetrievalError};

use crate::normalize::finalize;

/// OpenAI-compatible `/v1/embeddings` endpoint.
pub struct RemoteProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    send_dimensions: bool,
    id: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl RemoteProvider {
    pub fn new(endpoint: &str, model: &str, dim: usize, api_key: Option<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
            dim,
            send_dimensions: false,
            id: format!("remote:{model}:d{dim}"),
        })
    }

    /// Ask the endpoint to shorten its vectors to `dimension()`.
    pub fn send_dimensions(mut self, on: bool) -> Self {
        self.send_dimensions = on;
        self
    }

    /// Newlines degrade embedding quality on these models; they are sent as spaces.
    fn request_body(&self, texts: &[String]) -> EmbeddingRequest<'_> {
        EmbeddingRequest {
            model: &self.model,
            input: texts.iter().map(|t| t.replace(['\r', '\n'], " ")).collect(),
            dimensions: self.send_dimensions.then_some(self.dim),
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), model = %self.model, "remote embedding request");
        let body = self.request_body(texts);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| RetrievalError::EmbeddingFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorBody>(&error_text).map_or(error_text, |b| b.error.message);
            return Err(RetrievalError::EmbeddingFailure(format!("embedding API error ({status}): {detail}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::EmbeddingFailure(format!("Failed to parse response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(RetrievalError::EmbeddingFailure(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        data.into_iter().map(|d| finalize(d.embedding, self.dim)).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn provider_id(&self) -> &str { &self.id }

    fn dimension(&self) -> usize { self.dim }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.request(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| RetrievalError::EmbeddingFailure("no vector for query".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_out_of_order() {
        let body = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}],"model":"m"}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(body).expect("parse");
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn api_error_message_is_extracted() {
        let body = r#"{"error":{"message":"invalid api key","type":"auth"}}"#;
        let parsed: ApiErrorBody = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.error.message, "invalid api key");
    }

    #[test]
    fn request_body_flattens_newlines_and_omits_dimensions_by_default() {
        let provider = RemoteProvider::new("http://localhost/v1/embeddings", "m", 8, None, 2).expect("client");
        let texts = vec!["고양이\n사료".to_string(), "털빠짐\r\n관리".to_string()];
        let body = serde_json::to_value(provider.request_body(&texts)).expect("json");
        assert_eq!(body, serde_json::json!({"model": "m", "input": ["고양이 사료", "털빠짐  관리"]}));

        let shortened = provider.send_dimensions(true);
        let body = serde_json::to_value(shortened.request_body(&texts)).expect("json");
        assert_eq!(body["dimensions"], 8);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_embedding_failure() {
        let provider = RemoteProvider::new("http://127.0.0.1:9/v1/embeddings", "m", 8, None, 2).expect("client");
        let err = provider.embed_query("고양이").await.expect_err("no server");
        assert!(matches!(err, RetrievalError::EmbeddingFailure(_)));
    }

    #[tokio::test]
    #[ignore = "calls the OpenAI API; needs OPENAI_API_KEY"]
    async fn openai_embeddings_have_configured_dimension() {
        let key = std::env::var("OPENAI_API_KEY").ok();
        let provider = RemoteProvider::new("https://api.openai.com/v1/embeddings", "text-embedding-3-small", 1536, key, 30).expect("client");
        let v = provider.embed_query("조용한 고양이").await.expect("embed");
        assert_eq!(v.len(), 1536);
    }
}
