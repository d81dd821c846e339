use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed action vocabulary. Each variant carries its own typed
/// parameters; the loosely-keyed mapping the planner emits is normalized
/// in `Action::from_plan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum ActionKind {
    Tap {
        x: i32,
        y: i32,
    },
    LongPress {
        x: i32,
        y: i32,
        duration_ms: u32,
    },
    Swipe {
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: u32,
    },
    Drag {
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: u32,
    },
    InputText {
        text: String,
    },
    PressKey {
        key: String,
    },
    Wait {
        seconds: f64,
    },
    ScrollUp,
    ScrollDown,
    GoBack,
    GoHome,
    OpenApp {
        package: String,
    },
    TaskComplete,
    TaskFailed,
}

impl ActionKind {
    /// Canonical label, matching the planner vocabulary.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Tap { .. } => "tap",
            ActionKind::LongPress { .. } => "long_press",
            ActionKind::Swipe { .. } => "swipe",
            ActionKind::Drag { .. } => "drag",
            ActionKind::InputText { .. } => "input_text",
            ActionKind::PressKey { .. } => "press_key",
            ActionKind::Wait { .. } => "wait",
            ActionKind::ScrollUp => "scroll_up",
            ActionKind::ScrollDown => "scroll_down",
            ActionKind::GoBack => "go_back",
            ActionKind::GoHome => "go_home",
            ActionKind::OpenApp { .. } => "open_app",
            ActionKind::TaskComplete => "task_complete",
            ActionKind::TaskFailed => "task_failed",
        }
    }

    /// Terminal pseudo-actions are resolved by the loop, not the executor.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionKind::TaskComplete | ActionKind::TaskFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default)]
    pub reasoning: String,
}

impl Action {
    pub fn new(kind: ActionKind, reasoning: impl Into<String>) -> Self {
        Self {
            kind,
            reasoning: reasoning.into(),
        }
    }

    pub fn wait(seconds: f64, reasoning: impl Into<String>) -> Self {
        Self::new(ActionKind::Wait { seconds }, reasoning)
    }

    pub fn task_failed(reasoning: impl Into<String>) -> Self {
        Self::new(ActionKind::TaskFailed, reasoning)
    }

    pub fn task_complete(reasoning: impl Into<String>) -> Self {
        Self::new(ActionKind::TaskComplete, reasoning)
    }

    /// Build an Action from a parsed planner response of the form
    /// `{"action": "TAP", "params": {...}, "reasoning": "..."}`.
    ///
    /// The label is case-insensitive with spaces normalized to underscores
    /// and runs through a synonym table. Unrecognized labels fall back to
    /// `Wait` with a logged warning so a malformed planner response never
    /// crashes the loop.
    pub fn from_plan(data: &Value) -> Self {
        let label = normalize_label(data["action"].as_str().unwrap_or(""));
        let params = &data["params"];
        let reasoning = data["reasoning"].as_str().unwrap_or("").to_string();

        let kind = match kind_from_label(&label, params) {
            Some(kind) => kind,
            None => {
                tracing::warn!(label = %label, "unrecognized action label, defaulting to wait");
                ActionKind::Wait { seconds: 1.0 }
            }
        };

        Action { kind, reasoning }
    }
}

/// Lowercase, spaces to underscores. Pure and deterministic.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

/// Numeric parameter lookup with an alternate key (e.g. `start_x` vs `x1`).
fn int_param(params: &Value, key: &str, alt: &str, default: i64) -> i64 {
    params[key]
        .as_i64()
        .or_else(|| params[alt].as_i64())
        .unwrap_or(default)
}

fn kind_from_label(label: &str, params: &Value) -> Option<ActionKind> {
    let kind = match label {
        "tap" => ActionKind::Tap {
            x: int_param(params, "x", "x", 0) as i32,
            y: int_param(params, "y", "y", 0) as i32,
        },
        "long_press" => ActionKind::LongPress {
            x: int_param(params, "x", "x", 0) as i32,
            y: int_param(params, "y", "y", 0) as i32,
            duration_ms: int_param(params, "duration_ms", "duration", 1000) as u32,
        },
        "swipe" => ActionKind::Swipe {
            start_x: int_param(params, "start_x", "x1", 0) as i32,
            start_y: int_param(params, "start_y", "y1", 0) as i32,
            end_x: int_param(params, "end_x", "x2", 0) as i32,
            end_y: int_param(params, "end_y", "y2", 0) as i32,
            duration_ms: int_param(params, "duration_ms", "duration", 300) as u32,
        },
        "drag" => ActionKind::Drag {
            start_x: int_param(params, "start_x", "x1", 0) as i32,
            start_y: int_param(params, "start_y", "y1", 0) as i32,
            end_x: int_param(params, "end_x", "x2", 0) as i32,
            end_y: int_param(params, "end_y", "y2", 0) as i32,
            duration_ms: int_param(params, "duration_ms", "duration", 1000) as u32,
        },
        "input_text" | "input" | "type" => ActionKind::InputText {
            text: params["text"].as_str().unwrap_or("").to_string(),
        },
        "press_key" | "keypress" => ActionKind::PressKey {
            key: params["key"]
                .as_str()
                .or_else(|| params["keycode"].as_str())
                .unwrap_or("")
                .to_string(),
        },
        "wait" => ActionKind::Wait {
            seconds: params["seconds"]
                .as_f64()
                .or_else(|| params["duration"].as_f64())
                .unwrap_or(1.0),
        },
        "scroll_up" => ActionKind::ScrollUp,
        "scroll_down" => ActionKind::ScrollDown,
        "go_back" | "back" => ActionKind::GoBack,
        "go_home" | "home" => ActionKind::GoHome,
        "open_app" | "launch_app" => ActionKind::OpenApp {
            package: params["package"]
                .as_str()
                .or_else(|| params["app"].as_str())
                .unwrap_or("")
                .to_string(),
        },
        "task_complete" | "done" | "complete" => ActionKind::TaskComplete,
        "task_failed" | "fail" | "failed" => ActionKind::TaskFailed,
        _ => return None,
    };
    Some(kind)
}
