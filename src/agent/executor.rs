use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::action::{Action, ActionKind};
use crate::agent::state::ActionResult;
use crate::device::tools::DeviceTools;

// Screen-relative defaults for synthesized scroll swipes (1080-wide screens).
const SCROLL_X: i32 = 540;
const SCROLL_FAR_Y: i32 = 1500;
const SCROLL_NEAR_Y: i32 = 500;
const SCROLL_DURATION_MS: u32 = 300;

/// Execution boundary; the engine depends on this trait.
#[async_trait]
pub trait Execute: Send + Sync {
    /// Perform one action against the device. Failures never propagate;
    /// they come back as failed ActionResults with measured duration.
    async fn execute(&self, action: &Action) -> ActionResult;
}

/// The "hands" of the pipeline: maps each action variant onto exactly one
/// device operation and normalizes the JSON envelope it gets back.
pub struct Executor {
    tools: DeviceTools,
}

impl Executor {
    pub fn new(tools: DeviceTools) -> Self {
        Self { tools }
    }

    async fn dispatch(&self, action: &Action) -> (bool, String) {
        match &action.kind {
            ActionKind::Tap { x, y } => parse_envelope(self.tools.tap(*x, *y).await),
            ActionKind::LongPress { x, y, duration_ms } => {
                parse_envelope(self.tools.long_press(*x, *y, *duration_ms).await)
            }
            ActionKind::Swipe {
                start_x,
                start_y,
                end_x,
                end_y,
                duration_ms,
            } => parse_envelope(
                self.tools
                    .swipe(*start_x, *start_y, *end_x, *end_y, *duration_ms)
                    .await,
            ),
            ActionKind::Drag {
                start_x,
                start_y,
                end_x,
                end_y,
                duration_ms,
            } => parse_envelope(
                self.tools
                    .drag(*start_x, *start_y, *end_x, *end_y, *duration_ms)
                    .await,
            ),
            ActionKind::InputText { text } => parse_envelope(self.tools.input_text(text).await),
            ActionKind::PressKey { key } => parse_envelope(self.tools.press_key(key, false).await),
            ActionKind::Wait { seconds } => {
                tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
                (true, format!("Waited {seconds} seconds"))
            }
            ActionKind::ScrollUp => parse_envelope(
                self.tools
                    .swipe(
                        SCROLL_X,
                        SCROLL_FAR_Y,
                        SCROLL_X,
                        SCROLL_NEAR_Y,
                        SCROLL_DURATION_MS,
                    )
                    .await,
            ),
            ActionKind::ScrollDown => parse_envelope(
                self.tools
                    .swipe(
                        SCROLL_X,
                        SCROLL_NEAR_Y,
                        SCROLL_X,
                        SCROLL_FAR_Y,
                        SCROLL_DURATION_MS,
                    )
                    .await,
            ),
            ActionKind::GoBack => parse_envelope(self.tools.press_key("back", false).await),
            ActionKind::GoHome => parse_envelope(self.tools.press_key("home", false).await),
            ActionKind::OpenApp { package } => parse_envelope(self.tools.start_app(package).await),
            // Terminal pseudo-actions are resolved by the loop; executing
            // them directly is an always-successful no-op.
            ActionKind::TaskComplete => (true, "Task marked as complete".into()),
            ActionKind::TaskFailed => (true, "Task marked as failed".into()),
        }
    }
}

#[async_trait]
impl Execute for Executor {
    async fn execute(&self, action: &Action) -> ActionResult {
        let start = Instant::now();
        let (success, message) = self.dispatch(action).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            action = action.kind.label(),
            success,
            duration_ms,
            "action executed"
        );

        let result = if success {
            ActionResult::ok(message, duration_ms)
        } else {
            ActionResult::failed(message, duration_ms)
        };
        result.for_action(action)
    }
}

/// Normalize a tool envelope into `(success, message)`. A non-object
/// envelope is treated as a successful free-text result, matching the
/// legacy call format.
fn parse_envelope(envelope: Value) -> (bool, String) {
    match envelope.as_object() {
        Some(obj) => {
            let success = obj
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if success {
                (true, "OK".into())
            } else {
                let message = obj
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("OK")
                    .to_string();
                (false, message)
            }
        }
        None => (
            true,
            envelope.as_str().map(String::from).unwrap_or_default(),
        ),
    }
}
