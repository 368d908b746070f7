//! Embedding backends and vector utilities.
//!
//! Two HTTP backends are supported: an Ollama-compatible server
//! (`/api/embeddings`, the default for local-first setups) and the OpenAI
//! embeddings API. Transient failures are retried with linear backoff;
//! client errors fail immediately.
//!
//! Vectors are stored as little-endian `f32` BLOBs in SQLite; similarity
//! is computed in Rust with [`cosine_similarity`].

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::llm::backoff_sleep;

/// Embed a batch of texts using the configured provider. Returns one
/// vector per input, in input order.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "ollama" => embed_ollama(config, texts).await,
        "openai" => embed_openai(config, texts).await,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query text (search-time convenience).
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Ollama embeddings: one request per text against `POST /api/embeddings`.
async fn embed_ollama(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let url = format!(
        "{}/api/embeddings",
        config.base_url.trim_end_matches('/')
    );

    let mut embeddings = Vec::with_capacity(texts.len());
    for text in texts {
        let body = serde_json::json!({
            "model": config.model,
            "prompt": text,
        });

        let mut last_err = None;
        let mut vector = None;

        for attempt in 1..=config.max_retries {
            if attempt > 1 {
                backoff_sleep(attempt - 1, config.backoff_ms).await;
            }

            match client.post(&url).json(&body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        vector = Some(parse_embedding_field(&json, "embedding")?);
                        break;
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err =
                            Some(anyhow::anyhow!("embedding server returned {}", status));
                        continue;
                    }
                    let text = response.text().await.unwrap_or_default();
                    bail!("embedding server error {}: {}", status, text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        match vector {
            Some(v) => embeddings.push(v),
            None => {
                return Err(
                    last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries"))
                )
            }
        }
    }

    Ok(embeddings)
}

fn parse_embedding_field(json: &serde_json::Value, field: &str) -> Result<Vec<f32>> {
    let values = json
        .get(field)
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing '{}' array", field))?;
    Ok(values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// OpenAI embeddings: batched `POST /v1/embeddings`. Requires the
/// `OPENAI_API_KEY` environment variable.
async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": config.model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 1..=config.max_retries {
        if attempt > 1 {
            backoff_sleep(attempt - 1, config.backoff_ms).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_openai_response(&json);
                }
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                    continue;
                }
                let body_text = response.text().await.unwrap_or_default();
                bail!("OpenAI API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        embeddings.push(parse_embedding_field(item, "embedding")?);
    }
    Ok(embeddings)
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
