use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::agent::action::{Action, ActionKind};
use crate::agent::executor::Execute;
use crate::agent::planner::{HistorySnippet, Plan, PlannerContext};
use crate::agent::state::{ActionResult, AgentStatus, RunOutcome, StepRecord};
use crate::config::AgentConfig;
use crate::errors::PilotResult;
use crate::perception::Perceiver;

/// Cooperative cancellation: sets a flag that the loop checks once at the
/// top of each iteration. An in-flight step always runs to completion.
#[derive(Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub type StepCallback = Box<dyn Fn(&StepRecord) + Send + Sync>;

/// The perceive -> plan -> execute loop. Owns the append-only history;
/// no other component writes to it.
pub struct VlaAgent {
    task: String,
    config: AgentConfig,
    perceiver: Box<dyn Perceiver>,
    planner: Box<dyn Plan>,
    executor: Box<dyn Execute>,
    history: Vec<StepRecord>,
    status: AgentStatus,
    stop: StopHandle,
    on_step: Option<StepCallback>,
}

impl VlaAgent {
    pub fn new(
        task: impl Into<String>,
        config: AgentConfig,
        perceiver: Box<dyn Perceiver>,
        planner: Box<dyn Plan>,
        executor: Box<dyn Execute>,
    ) -> Self {
        Self {
            task: task.into(),
            config,
            perceiver,
            planner,
            executor,
            history: Vec::new(),
            status: AgentStatus::Idle,
            stop: StopHandle::new(),
            on_step: None,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Register a per-step progress callback.
    pub fn on_step(&mut self, callback: StepCallback) {
        self.on_step = Some(callback);
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// Run the loop to a terminal outcome. Per-step errors are caught at
    /// this boundary and mapped to a failed outcome; nothing escapes.
    pub async fn run(&mut self) -> RunOutcome {
        let start = Instant::now();
        self.status = AgentStatus::Running;
        self.history.clear();

        tracing::info!(
            task = %self.task,
            max_steps = self.config.max_steps,
            "starting VLA agent"
        );

        for step in 1..=self.config.max_steps {
            if self.stop.is_stopped() {
                tracing::info!(step, "stop requested");
                self.status = AgentStatus::Stopped;
                return self.build_outcome(false, Some("Agent stopped by user".into()), start);
            }

            let action = match self.execute_step(step).await {
                Ok(action) => action,
                Err(e) => {
                    tracing::error!(step, error = %e, "step failed");
                    self.status = AgentStatus::Failed;
                    return self.build_outcome(false, Some(e.to_string()), start);
                }
            };

            match action.kind {
                ActionKind::TaskComplete => {
                    tracing::info!(step, "task completed");
                    self.status = AgentStatus::Completed;
                    return self.build_outcome(true, None, start);
                }
                ActionKind::TaskFailed => {
                    tracing::warn!(step, reason = %action.reasoning, "task failed");
                    self.status = AgentStatus::Failed;
                    return self.build_outcome(false, Some(action.reasoning.clone()), start);
                }
                _ => {}
            }

            tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
        }

        tracing::warn!(max_steps = self.config.max_steps, "step budget exhausted");
        self.status = AgentStatus::Failed;
        let error = format!("Max steps ({}) reached", self.config.max_steps);
        self.build_outcome(false, Some(error), start)
    }

    async fn execute_step(&mut self, step_number: u32) -> PilotResult<Action> {
        let step_start = Instant::now();

        // 1. Perceive, after a settle delay so animations can finish.
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
        let screenshot = self.perceiver.capture_screenshot().await?;
        let ui_state = self.perceiver.analyze_screenshot(&screenshot, None).await;

        tracing::info!(
            step = step_number,
            screen = %ui_state.app_name,
            elements = ui_state.elements.len(),
            "screen analyzed"
        );

        // 2. Plan, with the trailing window of history.
        let window_start = self.history.len().saturating_sub(self.config.history_length);
        let snippets: Vec<HistorySnippet> = self.history[window_start..]
            .iter()
            .map(|h| HistorySnippet {
                action_label: h.action["type"].as_str().unwrap_or("unknown").to_string(),
                success: h.result["success"].as_bool().unwrap_or(false),
                screen_summary: h.ui_state_summary.clone(),
            })
            .collect();

        let ctx = PlannerContext {
            task: &self.task,
            ui_state: &ui_state,
            history: &snippets,
            step_number,
            max_steps: self.config.max_steps,
        };
        let action = self.planner.plan_next_action(&ctx).await;

        tracing::info!(
            step = step_number,
            action = action.kind.label(),
            reasoning = %action.reasoning,
            "action planned"
        );

        // 3. Execute, unless the action is a terminal pseudo-action.
        let result = if action.kind.is_terminal() {
            ActionResult::ok(action.reasoning.clone(), 0).for_action(&action)
        } else {
            self.executor.execute(&action).await
        };

        tracing::info!(
            step = step_number,
            success = result.success,
            message = %result.message,
            "action executed"
        );

        let record = StepRecord {
            step_number,
            timestamp: Utc::now(),
            ui_state_summary: ui_state.summary(),
            action: serde_json::to_value(&action).unwrap_or_default(),
            result: serde_json::to_value(&result).unwrap_or_default(),
            screenshot_path: Some(screenshot),
            duration_ms: step_start.elapsed().as_millis() as u64,
        };
        if let Some(callback) = &self.on_step {
            callback(&record);
        }
        self.history.push(record);

        Ok(action)
    }

    fn build_outcome(
        &self,
        success: bool,
        error: Option<String>,
        start: Instant,
    ) -> RunOutcome {
        let final_screen = self
            .history
            .last()
            .and_then(|h| h.screenshot_path.clone());
        RunOutcome {
            success,
            status: self.status,
            task: self.task.clone(),
            total_steps: self.history.len() as u32,
            total_duration_ms: start.elapsed().as_millis() as u64,
            final_screen,
            error,
            history: self.history.clone(),
        }
    }
}
