use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::action::Action;
use crate::llm::parse::{strip_code_fences, truncate_chars};
use crate::llm::provider::ChatProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::types::UIState;

const SYSTEM_PROMPT: &str = "\
You are an Android automation agent. Your job is to analyze the current screen state and decide the next action to accomplish the given task.

## Available Actions

You can perform these actions:
- TAP(x, y) - Tap at screen coordinates
- LONG_PRESS(x, y, duration_ms) - Long press at coordinates
- SWIPE(start_x, start_y, end_x, end_y) - Swipe gesture
- DRAG(start_x, start_y, end_x, end_y) - Drag gesture
- INPUT_TEXT(text) - Type text (screen must have focused input field)
- PRESS_KEY(key) - Press key: back, home, enter, delete, menu, search
- WAIT(seconds) - Wait for UI to update
- SCROLL_UP() - Scroll the screen up
- SCROLL_DOWN() - Scroll the screen down
- GO_BACK() - Press back button
- GO_HOME() - Press home button
- OPEN_APP(package) - Launch app by package name
- TASK_COMPLETE() - Task is finished successfully
- TASK_FAILED() - Task cannot be completed

## Response Format

You MUST respond with valid JSON only:
```json
{
    \"action\": \"TAP\",
    \"params\": {
        \"x\": 540,
        \"y\": 1200
    },
    \"reasoning\": \"Tapping the Install button to begin app installation\"
}
```

## Guidelines

1. Always check if the task is already complete before taking action
2. If you see an error or unexpected popup, handle it first
3. Use exact coordinates from the UI elements when tapping
4. After typing text, you may need to tap a button or press enter
5. If stuck, try scrolling to find the needed element
6. If task seems impossible, return TASK_FAILED with explanation
7. Be patient - some actions take time (install, download, etc.)
8. Maximum steps allowed - if running out, prioritize completion

## Common Patterns

- To search: tap search field -> input text -> tap search button or press enter
- To install app: tap Install -> wait -> tap Open (or handle permissions)
- To login: input username -> tap next -> input password -> tap login
- To scroll: use SCROLL_DOWN to see more content
- To dismiss popup: tap outside, tap X, or press back";

const EVAL_SYSTEM_PROMPT: &str =
    "You evaluate if Android automation tasks are complete. Respond with JSON only.";

const MAX_PROMPT_ELEMENTS: usize = 20;
const MAX_PROMPT_SUGGESTIONS: usize = 10;

/// One entry of the trailing action history fed back to the LLM.
#[derive(Debug, Clone)]
pub struct HistorySnippet {
    pub action_label: String,
    pub success: bool,
    pub screen_summary: String,
}

/// Everything the planner needs to decide the single next action.
#[derive(Debug, Clone)]
pub struct PlannerContext<'a> {
    pub task: &'a str,
    pub ui_state: &'a UIState,
    pub history: &'a [HistorySnippet],
    pub step_number: u32,
    pub max_steps: u32,
}

impl PlannerContext<'_> {
    pub fn to_prompt(&self) -> String {
        let mut prompt = format!(
            "## Task\n{}\n\n## Current Step\nStep {} of {}\n\n\
             ## Current Screen State\nApp/Screen: {}\nDescription: {}\n\n\
             ### UI Elements on Screen\n{}\n\n\
             ### Error/Popup Status\n- Error visible: {}\n- Popup visible: {}\n\n\
             ### Suggested Actions from Vision\n{}\n",
            self.task,
            self.step_number,
            self.max_steps,
            self.ui_state.app_name,
            self.ui_state.screen_description,
            self.format_elements(),
            self.ui_state.error_message.as_deref().unwrap_or("None"),
            self.ui_state.popup_visible,
            self.format_suggestions(),
        );

        if !self.history.is_empty() {
            prompt.push_str("\n## Recent Action History\n");
            for (i, h) in self.history.iter().enumerate() {
                let _ = writeln!(
                    prompt,
                    "{}. Action: {}\n   Result: {}\n   Screen after: {}",
                    i + 1,
                    h.action_label,
                    if h.success { "success" } else { "failed" },
                    h.screen_summary,
                );
            }
        }

        prompt
    }

    fn format_elements(&self) -> String {
        if self.ui_state.elements.is_empty() {
            return "No interactive elements detected".into();
        }
        let mut lines: Vec<String> = self
            .ui_state
            .elements
            .iter()
            .take(MAX_PROMPT_ELEMENTS)
            .map(|e| {
                format!(
                    "- [{}] \"{}\" at ({}, {}){}",
                    e.element_type.as_str(),
                    e.text,
                    e.x,
                    e.y,
                    if e.clickable { " (clickable)" } else { "" },
                )
            })
            .collect();
        if self.ui_state.elements.len() > MAX_PROMPT_ELEMENTS {
            lines.push(format!(
                "... and {} more elements",
                self.ui_state.elements.len() - MAX_PROMPT_ELEMENTS
            ));
        }
        lines.join("\n")
    }

    fn format_suggestions(&self) -> String {
        if self.ui_state.available_actions.is_empty() {
            return "No specific actions suggested".into();
        }
        self.ui_state
            .available_actions
            .iter()
            .take(MAX_PROMPT_SUGGESTIONS)
            .map(|a| format!("- {a}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Independent completion check: does the LLM think the task is done?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEval {
    pub complete: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

impl CompletionEval {
    /// `complete` is authoritative only above the configured confidence.
    pub fn is_authoritative(&self, threshold: f64) -> bool {
        self.complete && self.confidence > threshold
    }
}

/// Planning boundary; the engine depends on this trait.
#[async_trait]
pub trait Plan: Send + Sync {
    /// Decide the single next action. All failure modes come back as
    /// actions (wait on timeout, task_failed on broken calls); never errors.
    async fn plan_next_action(&self, ctx: &PlannerContext<'_>) -> Action;
}

/// The "brain" of the pipeline: prompts the planning model and parses its
/// response defensively.
pub struct LlmPlanner {
    provider: Arc<dyn ChatProvider>,
    call: CallConfig,
}

impl LlmPlanner {
    pub fn new(provider: Arc<dyn ChatProvider>, call: CallConfig) -> Self {
        Self { provider, call }
    }

    fn parse_response(&self, response: &str) -> Action {
        let json_str = strip_code_fences(response);
        match serde_json::from_str::<serde_json::Value>(json_str) {
            Ok(data) => Action::from_plan(&data),
            Err(_) => classify_plain_text(response),
        }
    }

    /// Ask the model whether the task is done, independent of planning.
    pub async fn evaluate_completion(
        &self,
        task: &str,
        ui_state: &UIState,
        history_len: usize,
    ) -> CompletionEval {
        let user_message = format!(
            "## Task\n{task}\n\n## Current Screen\nApp: {}\nDescription: {}\n\n\
             ## Action History\n{history_len} actions taken\n\n\
             ## Question\nIs this task complete? Evaluate the current screen against the task goal.\n\n\
             Respond with JSON:\n```json\n{{\n    \"complete\": true/false,\n    \"confidence\": 0.0-1.0,\n    \"reason\": \"explanation\"\n}}\n```",
            ui_state.app_name, ui_state.screen_description,
        );

        let messages = vec![
            ChatMessage::system(EVAL_SYSTEM_PROMPT),
            ChatMessage::user(user_message),
        ];

        let mut call = self.call.clone();
        call.max_tokens = 500;

        match self.provider.chat(messages, &call).await {
            Ok(content) => {
                let json_str = strip_code_fences(&content);
                serde_json::from_str(json_str).unwrap_or_else(|e| CompletionEval {
                    complete: false,
                    confidence: 0.0,
                    reason: format!("Evaluation error: {e}"),
                })
            }
            Err(e) => CompletionEval {
                complete: false,
                confidence: 0.0,
                reason: format!("Evaluation error: {e}"),
            },
        }
    }
}

#[async_trait]
impl Plan for LlmPlanner {
    async fn plan_next_action(&self, ctx: &PlannerContext<'_>) -> Action {
        let user_message = format!(
            "{}\n## Your Task\nBased on the current screen state and task goal, \
             what is the single next action to take?\n\nRemember:\n\
             - Respond with JSON only\n\
             - Use exact coordinates from the UI elements list\n\
             - If task is complete, use TASK_COMPLETE\n\
             - If task is impossible, use TASK_FAILED with explanation",
            ctx.to_prompt()
        );

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_message),
        ];

        match self.provider.chat(messages, &self.call).await {
            Ok(content) => self.parse_response(&content),
            Err(e) if e.is_timeout() => {
                tracing::warn!("planner call timed out, waiting before retry");
                Action::wait(2.0, "LLM timeout - waiting before retry")
            }
            Err(e) => {
                // A broken planning call is the one unrecoverable failure
                // at this layer; distinguish it from a transient timeout.
                tracing::error!(error = %e, "planner call failed");
                Action::task_failed(format!("Planner error: {e}"))
            }
        }
    }
}

/// Fallback classifier for non-JSON planner output.
fn classify_plain_text(response: &str) -> Action {
    let lower = response.to_lowercase();
    if lower.contains("task_complete") || lower.contains("task is complete") {
        Action::task_complete(truncate_chars(response, 200))
    } else if lower.contains("task_failed") || lower.contains("cannot complete") {
        Action::task_failed(truncate_chars(response, 200))
    } else {
        Action::wait(
            1.0,
            format!("Could not parse response: {}", truncate_chars(response, 100)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::action::ActionKind;
    use crate::errors::{PilotError, PilotResult};
    use crate::perception::types::{ElementType, UIElement};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeProvider {
        response: Mutex<Option<PilotResult<String>>>,
    }

    impl FakeProvider {
        fn with(response: PilotResult<String>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for FakeProvider {
        async fn chat(
            &self,
            _messages: Vec<ChatMessage>,
            _cfg: &CallConfig,
        ) -> PilotResult<String> {
            self.response.lock().unwrap().take().unwrap()
        }
    }

    fn call_config() -> CallConfig {
        CallConfig {
            model: "test".into(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout: Duration::from_secs(1),
        }
    }

    fn state_with_elements(count: usize) -> UIState {
        UIState {
            app_name: "Settings".into(),
            screen_description: "Settings home".into(),
            elements: (0..count)
                .map(|i| UIElement {
                    element_type: ElementType::Button,
                    text: format!("Item {i}"),
                    x: 100,
                    y: 100 + i as i32 * 50,
                    width: None,
                    height: None,
                    clickable: true,
                    description: None,
                })
                .collect(),
            error_message: None,
            popup_visible: false,
            available_actions: vec!["scroll down".into()],
            raw_response: None,
        }
    }

    fn ctx<'a>(state: &'a UIState, history: &'a [HistorySnippet]) -> PlannerContext<'a> {
        PlannerContext {
            task: "open wifi settings",
            ui_state: state,
            history,
            step_number: 3,
            max_steps: 30,
        }
    }

    #[tokio::test]
    async fn fenced_and_unfenced_json_parse_identically() {
        let plain = r#"{"action": "TAP", "params": {"x": 10, "y": 20}, "reasoning": "go"}"#;
        let fenced = format!("```json\n{plain}\n```");

        let planner_a = LlmPlanner::new(FakeProvider::with(Ok(plain.into())), call_config());
        let planner_b = LlmPlanner::new(FakeProvider::with(Ok(fenced)), call_config());

        let state = state_with_elements(1);
        let a = planner_a.plan_next_action(&ctx(&state, &[])).await;
        let b = planner_b.plan_next_action(&ctx(&state, &[])).await;
        assert_eq!(a.kind, ActionKind::Tap { x: 10, y: 20 });
        assert_eq!(a.kind, b.kind);
    }

    #[tokio::test]
    async fn timeout_becomes_wait_action() {
        let planner = LlmPlanner::new(
            FakeProvider::with(Err(PilotError::LlmTimeout(60))),
            call_config(),
        );
        let state = state_with_elements(0);
        let action = planner.plan_next_action(&ctx(&state, &[])).await;
        assert_eq!(action.kind, ActionKind::Wait { seconds: 2.0 });
        assert!(action.reasoning.contains("timeout"));
    }

    #[tokio::test]
    async fn provider_failure_becomes_task_failed() {
        let planner = LlmPlanner::new(
            FakeProvider::with(Err(PilotError::LlmProvider("connection refused".into()))),
            call_config(),
        );
        let state = state_with_elements(0);
        let action = planner.plan_next_action(&ctx(&state, &[])).await;
        assert_eq!(action.kind, ActionKind::TaskFailed);
        assert!(action.reasoning.contains("connection refused"));
    }

    #[tokio::test]
    async fn plain_text_completion_is_classified() {
        let planner = LlmPlanner::new(
            FakeProvider::with(Ok("The task is complete, nothing left to do.".into())),
            call_config(),
        );
        let state = state_with_elements(0);
        let action = planner.plan_next_action(&ctx(&state, &[])).await;
        assert_eq!(action.kind, ActionKind::TaskComplete);
    }

    #[tokio::test]
    async fn unclassifiable_text_becomes_wait_with_excerpt() {
        let planner = LlmPlanner::new(
            FakeProvider::with(Ok("Hmm, let me think about this screen...".into())),
            call_config(),
        );
        let state = state_with_elements(0);
        let action = planner.plan_next_action(&ctx(&state, &[])).await;
        assert!(matches!(action.kind, ActionKind::Wait { .. }));
        assert!(action.reasoning.contains("Could not parse response"));
    }

    #[test]
    fn prompt_truncates_elements_at_twenty() {
        let state = state_with_elements(25);
        let prompt = ctx(&state, &[]).to_prompt();
        assert!(prompt.contains("Item 19"));
        assert!(!prompt.contains("Item 20\""));
        assert!(prompt.contains("... and 5 more elements"));
    }

    #[test]
    fn prompt_includes_history_window() {
        let state = state_with_elements(1);
        let history = vec![HistorySnippet {
            action_label: "tap".into(),
            success: true,
            screen_summary: "Settings: Settings home".into(),
        }];
        let prompt = ctx(&state, &history).to_prompt();
        assert!(prompt.contains("## Recent Action History"));
        assert!(prompt.contains("1. Action: tap"));
        assert!(prompt.contains("Result: success"));
    }

    #[tokio::test]
    async fn completion_eval_parses_fenced_json() {
        let planner = LlmPlanner::new(
            FakeProvider::with(Ok(
                "```json\n{\"complete\": true, \"confidence\": 0.9, \"reason\": \"wifi screen shown\"}\n```".into(),
            )),
            call_config(),
        );
        let state = state_with_elements(0);
        let eval = planner.evaluate_completion("open wifi", &state, 4).await;
        assert!(eval.is_authoritative(0.7));
        assert!(!eval.is_authoritative(0.95));
    }

    #[tokio::test]
    async fn completion_eval_errors_are_low_confidence() {
        let planner = LlmPlanner::new(
            FakeProvider::with(Err(PilotError::LlmProvider("boom".into()))),
            call_config(),
        );
        let state = state_with_elements(0);
        let eval = planner.evaluate_completion("open wifi", &state, 0).await;
        assert!(!eval.complete);
        assert!(eval.reason.contains("Evaluation error"));
    }
}
