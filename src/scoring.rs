use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ScoringConfig;
use crate::types::SubmissionRequest;

#[derive(Debug, Clone, Deserialize)]
pub struct EvalScores {
    pub model_size_score: f64,
    pub eval_score: f64,
    pub latency_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VibeScores {
    pub vibe_score: f64,
}

/// Client for one scoring service. Scoring POSTs are retried on a fixed
/// interval up to an absolute deadline; the restart signal is fire-and-forget
/// with its own short timeout.
#[derive(Clone)]
pub struct ScoringClient {
    client: Client,
    score_url: String,
    restart_url: String,
    retry_interval: Duration,
    retry_deadline: Duration,
    restart_timeout: Duration,
}

impl ScoringClient {
    pub fn new(base_url: &str, score_path: &str, config: &ScoringConfig) -> Self {
        let client = Client::builder()
            .user_agent("modelboard/0.1")
            .build()
            .expect("failed to build scoring HTTP client");
        let base = base_url.trim_end_matches('/');
        Self {
            client,
            score_url: format!("{base}{score_path}"),
            restart_url: format!("{base}/shutdown"),
            retry_interval: Duration::from_millis(config.retry_interval_ms),
            retry_deadline: Duration::from_millis(config.retry_deadline_ms),
            restart_timeout: Duration::from_millis(config.restart_timeout_ms),
        }
    }

    pub async fn eval_scores(&self, request: &SubmissionRequest) -> Result<EvalScores> {
        self.score(request).await
    }

    pub async fn vibe_scores(&self, request: &SubmissionRequest) -> Result<VibeScores> {
        self.score(request).await
    }

    async fn score<T: DeserializeOwned>(&self, request: &SubmissionRequest) -> Result<T> {
        retry_until_deadline(self.retry_interval, self.retry_deadline, || {
            let client = self.client.clone();
            let url = self.score_url.clone();
            let payload = request.clone();
            async move {
                let response = client
                    .post(&url)
                    .json(&payload)
                    .send()
                    .await
                    .with_context(|| format!("failed POST request: {url}"))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .with_context(|| format!("failed reading response body: {url}"))?;
                if !status.is_success() {
                    let preview: String = body.chars().take(180).collect();
                    return Err(anyhow!("POST {url} returned {status}: {preview}"));
                }
                serde_json::from_str(&body)
                    .with_context(|| format!("invalid JSON response: {url}"))
            }
        })
        .await
    }

    /// Ask the service to tear itself down and come back fresh. The scorers
    /// hold per-job model state, so this runs after every job; failures are
    /// ignored because the service may already be mid-restart.
    pub async fn restart(&self) {
        let result = self
            .client
            .post(&self.restart_url)
            .timeout(self.restart_timeout)
            .send()
            .await;
        if let Err(error) = result {
            debug!("restart signal to {} failed: {error}", self.restart_url);
        }
    }
}

/// Fixed-interval retry with an absolute deadline measured from the first
/// attempt. Returns the last error once the deadline has passed.
pub async fn retry_until_deadline<T, F, Fut>(
    interval: Duration,
    deadline: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if started.elapsed() >= deadline {
                    return Err(error);
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}
