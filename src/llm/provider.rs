use async_trait::async_trait;

use crate::errors::PilotResult;
use crate::llm::types::{CallConfig, ChatMessage};

/// Unified chat-completions boundary. Perception and the planner call
/// through this trait so tests can substitute a canned provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// One synchronous (non-streaming) chat call; returns the assistant
    /// message content. Timeouts surface as `PilotError::LlmTimeout` so
    /// callers can distinguish "retry later" from "give up".
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PilotResult<String>;
}
