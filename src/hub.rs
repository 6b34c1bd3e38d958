use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::Value;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 12;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("modelboard/0.1")
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

/// Repository-metadata collaborator. Admission only needs two numbers from
/// the hub; both return `Ok(None)` when the repository resolves but the
/// metadata is absent.
#[async_trait]
pub trait ModelHub: Send + Sync {
    async fn repo_size_bytes(
        &self,
        namespace: &str,
        name: &str,
        revision: &str,
    ) -> Result<Option<u64>>;

    async fn model_size_bytes(
        &self,
        namespace: &str,
        name: &str,
        revision: &str,
    ) -> Result<Option<u64>>;
}

pub struct HubClient {
    base_url: String,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }
}

#[async_trait]
impl ModelHub for HubClient {
    async fn repo_size_bytes(
        &self,
        namespace: &str,
        name: &str,
        revision: &str,
    ) -> Result<Option<u64>> {
        let url = format!(
            "{}/api/models/{namespace}/{name}/revision/{revision}",
            self.base_url
        );
        let info = fetch_json(&url).await?;
        let Some(siblings) = info.get("siblings").and_then(Value::as_array) else {
            return Ok(None);
        };
        let mut total = 0u64;
        let mut sized = 0usize;
        for entry in siblings {
            if let Some(size) = entry.get("size").and_then(Value::as_u64) {
                total += size;
                sized += 1;
            }
        }
        if sized == 0 {
            return Ok(None);
        }
        Ok(Some(total))
    }

    async fn model_size_bytes(
        &self,
        namespace: &str,
        name: &str,
        revision: &str,
    ) -> Result<Option<u64>> {
        let url = format!(
            "{}/{namespace}/{name}/resolve/{revision}/model.safetensors.index.json",
            self.base_url
        );
        let index = fetch_json(&url).await?;
        Ok(index
            .get("metadata")
            .and_then(|metadata| metadata.get("total_size"))
            .and_then(Value::as_u64))
    }
}

async fn fetch_json(url: &str) -> Result<Value> {
    let response = HTTP_CLIENT
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed GET request: {url}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("failed reading response body: {url}"))?;
    if !status.is_success() {
        let preview: String = body.chars().take(180).collect();
        return Err(anyhow!("GET {url} returned {status}: {preview}"));
    }
    serde_json::from_str(&body).with_context(|| format!("invalid JSON response: {url}"))
}
