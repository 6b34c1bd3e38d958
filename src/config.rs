use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_eval_url")]
    pub eval_url: String,
    #[serde(default = "default_vibe_url")]
    pub vibe_url: String,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_retry_deadline_ms")]
    pub retry_deadline_ms: u64,
    #[serde(default = "default_restart_timeout_ms")]
    pub restart_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_leaderboard_path")]
    pub leaderboard_path: String,
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_min_repo_size")]
    pub min_repo_size_bytes: u64,
    #[serde(default = "default_max_repo_size")]
    pub max_repo_size_bytes: u64,
    #[serde(default = "default_max_model_size")]
    pub max_model_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_hub_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MirrorConfig {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub eval_url: Option<String>,
    pub vibe_url: Option<String>,
    pub leaderboard_path: Option<String>,
    pub mirror_url: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/modelboard/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(eval_url) = overrides.eval_url {
            self.scoring.eval_url = eval_url;
        }
        if let Some(vibe_url) = overrides.vibe_url {
            self.scoring.vibe_url = vibe_url;
        }
        if let Some(leaderboard_path) = overrides.leaderboard_path {
            self.storage.leaderboard_path = leaderboard_path;
        }
        if let Some(mirror_url) = overrides.mirror_url {
            self.mirror.url = mirror_url;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_leaderboard_path(&self) -> PathBuf {
        expand_tilde(&self.storage.leaderboard_path)
    }

    pub fn default_template() -> String {
        let template = r#"[server]
host = "0.0.0.0"
port = 8000

[scoring]
eval_url = "http://localhost:8001"
vibe_url = "http://localhost:8002"
retry_interval_ms = 1000
retry_deadline_ms = 30000
restart_timeout_ms = 1000

[storage]
leaderboard_path = "~/.local/share/modelboard/leaderboard.csv"
save_interval_secs = 60

[admission]
min_repo_size_bytes = 10485760
max_repo_size_bytes = 85899345920
max_model_size_bytes = 32212254720

[hub]
base_url = "https://huggingface.co"

[mirror]
url = ""
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            eval_url: default_eval_url(),
            vibe_url: default_vibe_url(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_deadline_ms: default_retry_deadline_ms(),
            restart_timeout_ms: default_restart_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            leaderboard_path: default_leaderboard_path(),
            save_interval_secs: default_save_interval_secs(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_repo_size_bytes: default_min_repo_size(),
            max_repo_size_bytes: default_max_repo_size(),
            max_model_size_bytes: default_max_model_size(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: default_hub_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_eval_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_vibe_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_retry_interval_ms() -> u64 {
    1_000
}

fn default_retry_deadline_ms() -> u64 {
    30_000
}

fn default_restart_timeout_ms() -> u64 {
    1_000
}

fn default_leaderboard_path() -> String {
    "~/.local/share/modelboard/leaderboard.csv".to_string()
}

fn default_save_interval_secs() -> u64 {
    60
}

fn default_min_repo_size() -> u64 {
    10 * 1024 * 1024
}

fn default_max_repo_size() -> u64 {
    80 * 1024 * 1024 * 1024
}

fn default_max_model_size() -> u64 {
    30 * 1024 * 1024 * 1024
}

fn default_hub_url() -> String {
    "https://huggingface.co".to_string()
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn template_parses_back_to_defaults() {
        let parsed: Config =
            toml::from_str(&Config::default_template()).expect("template failed to parse");
        let defaults = Config::default();
        assert_eq!(parsed.server.port, defaults.server.port);
        assert_eq!(parsed.scoring.eval_url, defaults.scoring.eval_url);
        assert_eq!(parsed.scoring.retry_deadline_ms, defaults.scoring.retry_deadline_ms);
        assert_eq!(
            parsed.admission.max_model_size_bytes,
            defaults.admission.max_model_size_bytes
        );
        assert_eq!(parsed.storage.save_interval_secs, defaults.storage.save_interval_secs);
        assert!(parsed.mirror.url.is_empty());
    }
}
