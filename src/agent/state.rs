use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PilotResult;

/// Lifecycle states of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
}

/// One iteration of the loop. Appended to the history exactly once and
/// never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u32,
    pub timestamp: DateTime<Utc>,
    pub ui_state_summary: String,
    pub action: serde_json::Value,
    pub result: serde_json::Value,
    #[serde(default)]
    pub screenshot_path: Option<PathBuf>,
    pub duration_ms: u64,
}

/// Final verdict of a full run; constructed exactly once at loop exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub status: AgentStatus,
    pub task: String,
    pub total_steps: u32,
    pub total_duration_ms: u64,
    #[serde(default)]
    pub final_screen: Option<PathBuf>,
    #[serde(default)]
    pub error: Option<String>,
    pub history: Vec<StepRecord>,
}

impl RunOutcome {
    pub fn to_json(&self) -> PilotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Outcome of executing one action, carrying the action it resulted from.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub action: serde_json::Value,
    pub message: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            action: serde_json::Value::Null,
            message: message.into(),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        let error = error.into();
        Self {
            success: false,
            action: serde_json::Value::Null,
            message: "Execution failed".into(),
            error: Some(error),
            duration_ms,
        }
    }

    /// Attach the serialized action this result came from.
    pub fn for_action(mut self, action: &crate::agent::action::Action) -> Self {
        self.action = serde_json::to_value(action).unwrap_or_default();
        self
    }
}
