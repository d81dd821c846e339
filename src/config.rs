use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub screenshots: ScreenshotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Optional API key stored in config.toml (the DROIDPILOT_API_KEY env var wins).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Vision model: slower, gets a longer timeout and more output tokens.
    #[serde(default = "ModelEntry::vision_default")]
    pub vision: ModelEntry,
    /// Planning model: text-only, tighter budget.
    #[serde(default = "ModelEntry::planner_default")]
    pub planner: ModelEntry,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            vision: ModelEntry::vision_default(),
            planner: ModelEntry::planner_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ModelEntry {
    fn vision_default() -> Self {
        Self {
            model: "Qwen/Qwen3-VL-30B-A3B-Instruct".into(),
            temperature: 0.1,
            max_tokens: 4000,
            timeout_secs: 120,
        }
    }

    fn planner_default() -> Self {
        Self {
            model: "Qwen/Qwen3-Coder-30B-A3B-Instruct".into(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Pause after each executed action before the next perception cycle.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Pause before each screenshot so UI animations can finish.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Number of trailing history entries included in the planner prompt.
    #[serde(default = "default_history_length")]
    pub history_length: usize,
    /// Minimum confidence at which evaluate_completion is treated as authoritative.
    #[serde(default = "default_completion_confidence")]
    pub completion_confidence: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_delay_ms: default_step_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            history_length: default_history_length(),
            completion_confidence: default_completion_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Screenshots wider than this are downsampled before the VLM call.
    #[serde(default = "default_max_width")]
    pub max_width: Option<u32>,
    #[serde(default = "default_max_height")]
    pub max_height: Option<u32>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScreenshotConfig {
    /// Local directory screenshots are pulled into. Defaults to the user data dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl ScreenshotConfig {
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("droidpilot")
            .join("screenshots")
    }
}

fn default_api_base() -> String {
    "http://localhost:8000/v1".into()
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_steps() -> u32 {
    30
}

fn default_step_delay_ms() -> u64 {
    1500
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_history_length() -> usize {
    10
}

fn default_completion_confidence() -> f64 {
    0.7
}

fn default_max_width() -> Option<u32> {
    Some(1080)
}

fn default_max_height() -> Option<u32> {
    Some(2400)
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in working directory");
            return Some(candidate);
        }
    }

    None
}

pub fn load_config_from(path: &Path) -> PilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        vision = %config.llm.vision.model,
        planner = %config.llm.planner.model,
        "config loaded"
    );
    Ok(config)
}

/// Load config.toml from next to the executable or the working directory.
/// A missing file is not an error; built-in defaults apply.
pub fn load_config(override_path: Option<&Path>) -> PilotResult<AppConfig> {
    if let Some(path) = override_path {
        if !path.exists() {
            return Err(PilotError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return load_config_from(path);
    }

    match resolve_config_path() {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("no config.toml found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Resolve the API key: environment variable first, then config.toml.
pub fn resolve_api_key(config: &AppConfig) -> String {
    std::env::var("DROIDPILOT_API_KEY")
        .ok()
        .or_else(|| config.llm.api_key.clone())
        .unwrap_or_default()
}
