use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

use crate::leaderboard::EvaluationRecord;

/// Write-only remote copy of the leaderboard. Non-authoritative: callers log
/// and ignore push failures, local operation never depends on it.
#[derive(Clone)]
pub struct MirrorClient {
    client: Client,
    url: String,
}

impl MirrorClient {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent("modelboard/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build mirror HTTP client");
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn push(&self, records: &[EvaluationRecord]) -> Result<()> {
        self.client
            .post(&self.url)
            .json(records)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
