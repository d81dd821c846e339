use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("LLM request timed out after {0}s")]
    LlmTimeout(u64),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PilotError {
    /// True when the failure is a transient remote-call timeout that the
    /// agent loop should absorb and retry on the next cycle.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PilotError::LlmTimeout(_))
            || matches!(self, PilotError::Http(e) if e.is_timeout())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;
