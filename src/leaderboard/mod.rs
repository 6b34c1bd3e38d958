pub mod persist;
pub mod store;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ScoreSummary, SubmissionRequest};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown job status: {0}")]
pub struct JobStatusParseError(pub String);

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(JobStatusParseError(other.to_string())),
        }
    }
}

/// One leaderboard row per distinct submission fingerprint. Score fields stay
/// `None` until the matching evaluation phase has produced a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub hash: String,
    pub repo_namespace: String,
    pub repo_name: String,
    pub chat_template_type: String,
    pub model_size_score: Option<f64>,
    pub qualitative_score: Option<f64>,
    pub latency_score: Option<f64>,
    pub vibe_score: Option<f64>,
    pub total_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub status: JobStatus,
    pub notes: String,
}

impl EvaluationRecord {
    pub fn queued(request: &SubmissionRequest) -> Self {
        Self {
            hash: request.hash.clone(),
            repo_namespace: request.repo_namespace.clone(),
            repo_name: request.repo_name.clone(),
            chat_template_type: request.chat_template_type.clone(),
            model_size_score: None,
            qualitative_score: None,
            latency_score: None,
            vibe_score: None,
            total_score: None,
            timestamp: Utc::now(),
            status: JobStatus::Queued,
            notes: String::new(),
        }
    }

    pub fn scores(&self) -> ScoreSummary {
        ScoreSummary {
            model_size_score: self.model_size_score,
            qualitative_score: self.qualitative_score,
            latency_score: self.latency_score,
            vibe_score: self.vibe_score,
            total_score: self.total_score,
        }
    }
}

/// Partial update merged into an existing row; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub model_size_score: Option<f64>,
    pub qualitative_score: Option<f64>,
    pub latency_score: Option<f64>,
    pub vibe_score: Option<f64>,
    pub total_score: Option<f64>,
    pub status: Option<JobStatus>,
    pub notes: Option<String>,
}
