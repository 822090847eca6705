//! OpenAI-compatible embeddings provider.
//!
//! Works with OpenAI itself and any server exposing `POST /embeddings`
//! with the same request and response shape (Ollama, LM Studio, vLLM, ...).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tars_core::provider::EmbeddingProvider;
use tars_core::ProviderError;
use tracing::debug;

use crate::{check_status, transport_error};

/// Embedding client for `/embeddings` endpoints.
pub struct OpenAiCompatEmbedder {
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: Option<usize>,
    client: reqwest::Client,
}

impl OpenAiCompatEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dimensions: None,
            client,
        })
    }

    /// Request vectors of a fixed size (models that support truncation only).
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input,
            encoding_format: "float",
            dimensions: self.dimensions,
        };

        debug!(model = %self.model, inputs = input.len(), "Requesting embeddings");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let response = check_status(response, "embedding").await?;

        let parsed: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}")))?;

        let vectors = order_embeddings(parsed.data);
        if vectors.len() != input.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                input.len(),
                vectors.len()
            )));
        }
        if let Some(empty) = vectors.iter().position(|v| v.is_empty()) {
            return Err(ProviderError::InvalidResponse(format!(
                "embedding {empty} is empty"
            )));
        }
        Ok(vectors)
    }
}

/// Return vectors in input order. Servers that include `index` may reorder.
fn order_embeddings(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| d.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    /// Each input embeds to `[len, has_auth]`, returned in reverse order.
    async fn embeddings(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        let authed = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer sk-embed");
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let mut data: Vec<serde_json::Value> = inputs
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let len = text.as_str().map(|s| s.len()).unwrap_or(0) as f32;
                serde_json::json!({
                    "object": "embedding",
                    "index": i,
                    "embedding": [len, if authed { 1.0 } else { 0.0 }]
                })
            })
            .collect();
        data.reverse();
        Json(serde_json::json!({
            "object": "list",
            "data": data,
            "model": body["model"],
            "usage": {"prompt_tokens": 3, "total_tokens": 3}
        }))
    }

    fn embedder(base: &str, key: Option<&str>) -> OpenAiCompatEmbedder {
        OpenAiCompatEmbedder::new(base, key.map(String::from), "text-embedding-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn batch_is_returned_in_input_order() {
        let base = serve(Router::new().route("/embeddings", post(embeddings))).await;
        let e = embedder(&base, Some("sk-embed"));

        let vectors = e
            .embed_batch(&["a".to_string(), "abc".to_string(), "ab".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0], vec![2.0, 1.0]]);
        assert_eq!(e.model_name(), "text-embedding-test");
    }

    #[tokio::test]
    async fn single_embed_without_key_sends_no_auth() {
        let base = serve(Router::new().route("/embeddings", post(embeddings))).await;
        let v = embedder(&base, None).embed("hello").await.unwrap();
        assert_eq!(v, vec![5.0, 0.0]);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_network() {
        let e = embedder("http://127.0.0.1:9", None);
        assert!(e.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn count_mismatch_is_invalid_response() {
        let router = Router::new().route(
            "/embeddings",
            post(|| async { Json(serde_json::json!({"data": []})) }),
        );
        let base = serve(router).await;
        let err = embedder(&base, None).embed("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failed() {
        let router = Router::new().route("/embeddings", post(|| async { StatusCode::UNAUTHORIZED }));
        let base = serve(router).await;
        let err = embedder(&base, Some("wrong")).embed("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let err = embedder("http://127.0.0.1:9", None).embed("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_) | ProviderError::Timeout(_)));
    }

    #[test]
    fn order_falls_back_to_arrival_without_indices() {
        let data = vec![
            EmbeddingData { embedding: vec![1.0], index: None },
            EmbeddingData { embedding: vec![2.0], index: None },
        ];
        assert_eq!(order_embeddings(data), vec![vec![1.0], vec![2.0]]);
    }
}
