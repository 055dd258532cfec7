use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::markdown::RenderMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_refresh_horizon")]
    pub refresh_horizon_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_horizon_secs: default_refresh_horizon(),
        }
    }
}

fn default_refresh_horizon() -> i64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub use_rag: bool,
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_render")]
    pub render: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: None,
            use_rag: true,
            stream: true,
            stream_timeout_secs: default_stream_timeout(),
            render: default_render(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ChatConfig {
    pub fn render_mode(&self) -> RenderMode {
        RenderMode::parse(&self.render).unwrap_or(RenderMode::Markdown)
    }
}

fn default_true() -> bool {
    true
}
fn default_stream_timeout() -> u64 {
    120
}
fn default_render() -> String {
    "markdown".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_strategy")]
    pub chunking_strategy: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Send several queued files in one multipart request.
    #[serde(default = "default_true")]
    pub batch: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunking_strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            batch: true,
        }
    }
}

fn default_strategy() -> String {
    "sentence".to_string()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct TasksConfig {
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
        }
    }
}

fn default_refresh_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// Session file location. Defaults to `~/.ragchat/session.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if let Ok(p) = std::env::var("RAGCHAT_SESSION") {
            return PathBuf::from(p);
        }
        match &self.path {
            Some(p) => p.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ragchat")
                .join("session.json"),
        }
    }
}

pub const CHUNKING_STRATEGIES: &[&str] = &["fixed", "sentence", "paragraph", "semantic"];

impl Config {
    /// Config used by commands that never talk to the server.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                request_timeout_secs: default_request_timeout(),
            },
            auth: AuthConfig::default(),
            chat: ChatConfig::default(),
            upload: UploadConfig::default(),
            tasks: TasksConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Ok(url) = std::env::var("RAGCHAT_BASE_URL") {
        config.server.base_url = url;
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let base = config.server.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!("server.base_url must start with http:// or https://");
    }
    reqwest::Url::parse(base).with_context(|| format!("Invalid server.base_url: {}", base))?;

    if config.server.request_timeout_secs == 0 {
        anyhow::bail!("server.request_timeout_secs must be > 0");
    }

    if config.auth.refresh_horizon_secs < 0 {
        anyhow::bail!("auth.refresh_horizon_secs must be >= 0");
    }

    if config.chat.stream_timeout_secs == 0 {
        anyhow::bail!("chat.stream_timeout_secs must be > 0");
    }
    if RenderMode::parse(&config.chat.render).is_none() {
        anyhow::bail!(
            "Unknown chat.render mode: '{}'. Must be markdown or raw.",
            config.chat.render
        );
    }
    if let Some(t) = config.chat.temperature {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("chat.temperature must be in [0.0, 2.0]");
        }
    }

    if !CHUNKING_STRATEGIES.contains(&config.upload.chunking_strategy.as_str()) {
        anyhow::bail!(
            "Unknown upload.chunking_strategy: '{}'. Must be one of: {}",
            config.upload.chunking_strategy,
            CHUNKING_STRATEGIES.join(", ")
        );
    }
    if config.upload.chunk_size == 0 {
        anyhow::bail!("upload.chunk_size must be > 0");
    }
    if config.upload.chunk_overlap >= config.upload.chunk_size {
        anyhow::bail!("upload.chunk_overlap must be smaller than upload.chunk_size");
    }

    if config.tasks.refresh_secs == 0 {
        anyhow::bail!("tasks.refresh_secs must be > 0");
    }

    Ok(())
}
