//! Embedding provider client
//!
//! Mirrors an OpenAI-compatible HTTP embeddings endpoint — the same shape
//! Ollama and Docker Model Runner expose locally.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{MemoryError, Result};

/// Generates an embedding vector for a piece of text.
pub trait Embedder: Send + Sync {
    fn create_embedding(&self, text: &str) -> Result<Vec<f64>>;
}

/// OpenAI-compatible HTTP embedding client.
#[cfg(feature = "http-embedder")]
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

#[cfg(feature = "http-embedder")]
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[cfg(feature = "http-embedder")]
#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f64>,
}

#[cfg(feature = "http-embedder")]
impl HttpEmbedder {
    /// `base_url` defaults to `http://localhost:11434/v1` (Ollama). `timeout`
    /// should be 5s on the search path and 30s for probes
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(MemoryError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    pub fn default_base_url() -> &'static str {
        "http://localhost:11434/v1"
    }
}

#[cfg(feature = "http-embedder")]
impl Embedder for HttpEmbedder {
    fn create_embedding(&self, text: &str) -> Result<Vec<f64>> {
        if text.is_empty() {
            return Err(MemoryError::InvalidArgument("embedding input is empty".into()));
        }

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "input": [text], "model": self.model }))
            .send()
            .map_err(MemoryError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(MemoryError::External(format!(
                "embedder returned {status}: {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().map_err(MemoryError::Http)?;
        parsed.data.sort_by_key(|d| d.index);
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::External("embedder returned no data".into()))
    }
}

/// Stand-in used when embedding is disabled (`CLAUDE_MEMORY_EMBEDDER_URL=disabled`)
/// or in tests; always fails so callers exercise the same fallback path as a
/// real network error
pub struct NullEmbedder;

impl Embedder for NullEmbedder {
    fn create_embedding(&self, _text: &str) -> Result<Vec<f64>> {
        Err(MemoryError::External("embedder disabled".into()))
    }
}
