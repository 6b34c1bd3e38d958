use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::leaderboard::JobStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub repo_namespace: String,
    pub repo_name: String,
    pub chat_template_type: String,
    pub hash: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default = "default_competition_id")]
    pub competition_id: String,
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_competition_id() -> String {
    "d1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub model_size_score: Option<f64>,
    pub qualitative_score: Option<f64>,
    pub latency_score: Option<f64>,
    pub vibe_score: Option<f64>,
    pub total_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionStatus {
    pub scores: ScoreSummary,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    Vicuna,
    Chatml,
    Mistral,
    Zephyr,
    Alpaca,
    Llama2,
    Llama3,
}

impl ChatTemplate {
    pub const ALL: [ChatTemplate; 7] = [
        ChatTemplate::Vicuna,
        ChatTemplate::Chatml,
        ChatTemplate::Mistral,
        ChatTemplate::Zephyr,
        ChatTemplate::Alpaca,
        ChatTemplate::Llama2,
        ChatTemplate::Llama3,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Vicuna => "vicuna",
            Self::Chatml => "chatml",
            Self::Mistral => "mistral",
            Self::Zephyr => "zephyr",
            Self::Alpaca => "alpaca",
            Self::Llama2 => "llama2",
            Self::Llama3 => "llama3",
        }
    }
}

impl Display for ChatTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("chat template type not supported: {0}")]
pub struct ChatTemplateParseError(pub String);

impl FromStr for ChatTemplate {
    type Err = ChatTemplateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ChatTemplate::ALL
            .iter()
            .find(|template| template.as_slug() == normalized)
            .copied()
            .ok_or_else(|| ChatTemplateParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::ChatTemplate;

    #[test]
    fn parses_supported_templates() {
        for template in ChatTemplate::ALL {
            let parsed = ChatTemplate::from_str(template.as_slug()).expect("failed to parse slug");
            assert_eq!(parsed, template);
        }
        assert_eq!(
            ChatTemplate::from_str("ChatML").expect("case-insensitive parse failed"),
            ChatTemplate::Chatml
        );
    }

    #[test]
    fn rejects_unknown_template() {
        let error = ChatTemplate::from_str("gguf").unwrap_err();
        assert!(error.to_string().contains("gguf"));
    }
}
