// src/embeddings/openai.rs
// OpenAI-compatible embeddings HTTP client.
//
// Truncation, retry-with-delay, parallel batch chunking via
// `futures::future::join_all`, and response index-sorting, generalized to a
// configurable base URL/model/dimension so it also works against Azure
// OpenAI-compatible or self-hosted endpoints.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MemoryError, Result};

use super::Embeddings;

/// Max characters sent per input; longer text is truncated rather than
/// rejected (callers usually want *some* embedding, not an error).
const MAX_TEXT_CHARS: usize = 8000;
/// Provider-side batch cap; larger requests are chunked and parallelized.
const MAX_BATCH_SIZE: usize = 100;
const TIMEOUT_SECS: u64 = 30;
const RETRY_ATTEMPTS: usize = 2;

pub struct OpenAiEmbeddings {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    http: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(base_url: String, api_key: String, model: String, dimensions: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url,
            api_key,
            model,
            dimensions,
            http,
        }
    }

    fn truncate(text: &str) -> &str {
        if text.len() > MAX_TEXT_CHARS {
            &text[..MAX_TEXT_CHARS]
        } else {
            text
        }
    }

    async fn embed_batch_inner(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(|t| Self::truncate(t)).collect();
        let body = serde_json::json!({ "model": self.model, "input": inputs });

        let response = self
            .http
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MemoryError::Storage(format!(
                "embeddings batch API error {status}: {text}"
            )));
        }

        let json: serde_json::Value = response.json().await?;
        let data = json["data"]
            .as_array()
            .ok_or_else(|| MemoryError::Storage("invalid embeddings batch response".to_string()))?;

        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for item in data {
            let index = item["index"].as_u64().unwrap_or(0) as usize;
            if let Some(values) = item["embedding"].as_array() {
                let vec: Vec<f32> = values
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                indexed.push((index, vec));
            }
        }
        indexed.sort_by_key(|(i, _)| *i);
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

#[async_trait]
impl Embeddings for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = Self::truncate(text);
        let body = serde_json::json!({ "model": self.model, "input": text });

        let mut last_error: Option<MemoryError> = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            let sent = self
                .http
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match sent {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await?;
                    let embedding: Vec<f32> = json["data"][0]["embedding"]
                        .as_array()
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(|v| v.as_f64().map(|f| f as f32))
                                .collect()
                        })
                        .unwrap_or_default();
                    if embedding.len() == self.dimensions {
                        return Ok(embedding);
                    }
                    return Err(MemoryError::Storage(format!(
                        "embeddings response had {} dims, expected {}",
                        embedding.len(),
                        self.dimensions
                    )));
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    last_error = Some(MemoryError::Storage(format!(
                        "embeddings API error {status}: {text}"
                    )));
                }
                Err(e) => last_error = Some(MemoryError::from(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| MemoryError::Storage("unknown embeddings error".into())))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() <= 2 {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            return Ok(out);
        }

        let chunks: Vec<Vec<String>> = texts.chunks(MAX_BATCH_SIZE).map(|c| c.to_vec()).collect();
        if chunks.len() == 1 {
            return self.embed_batch_inner(&chunks[0]).await;
        }

        debug!(
            count = texts.len(),
            batches = chunks.len(),
            "embedding texts in parallel batches"
        );
        let futures: Vec<_> = chunks.iter().map(|chunk| self.embed_batch_inner(chunk)).collect();
        let results = futures::future::join_all(futures).await;

        let mut all = Vec::with_capacity(texts.len());
        for result in results {
            all.extend(result?);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_caps_at_max_chars() {
        let long = "a".repeat(10_000);
        assert_eq!(OpenAiEmbeddings::truncate(&long).len(), MAX_TEXT_CHARS);
    }
}
