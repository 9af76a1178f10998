//! # Sibling Resource Coordination
//!
//! The transcription model shares accelerator memory with a sibling LLM
//! service on the same host. Before loading a model here, that service is
//! asked to drop its own resident model (`keep_alive: 0` tells it to unload
//! immediately). The request is strictly best-effort: the sibling being
//! down, slow, or confused must never block a transcription job.

use serde_json::json;
use std::time::Duration;

/// Client for the competing resource consumer's release endpoint.
pub struct SiblingCoordinator {
    client: reqwest::Client,
    base_url: String,
}

impl SiblingCoordinator {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("sibling HTTP client");
        Self { client, base_url }
    }

    /// Ask the sibling to release its accelerator memory. Never fails.
    pub async fn request_release(&self) {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        tracing::info!("Requesting sibling model unload before load: {}", url);

        let result = self
            .client
            .post(&url)
            .json(&json!({"model": "", "keep_alive": 0}))
            .send()
            .await;

        match result {
            Ok(response) => {
                tracing::info!("Sibling unload responded: {}", response.status());
            }
            Err(err) if err.is_connect() => {
                tracing::info!("Sibling not reachable, skipping unload");
            }
            Err(err) => {
                tracing::warn!("Could not request sibling unload: {}", err);
            }
        }
    }
}
