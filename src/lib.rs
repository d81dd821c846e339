pub mod agent;
pub mod config;
pub mod device;
pub mod errors;
pub mod llm;
pub mod perception;

use std::sync::Arc;

use crate::agent::engine::VlaAgent;
use crate::agent::executor::Executor;
use crate::agent::planner::LlmPlanner;
use crate::config::AppConfig;
use crate::device::channel::AdbChannel;
use crate::device::tools::DeviceTools;
use crate::llm::openai::OpenAiChatProvider;
use crate::llm::provider::ChatProvider;
use crate::perception::Perception;

pub use crate::agent::state::{AgentStatus, RunOutcome, StepRecord};
pub use crate::errors::{PilotError, PilotResult};

/// Wire up a ready-to-run agent from config: one chat client shared by
/// perception and planning, one ADB channel shared by all device tools.
pub fn build_agent(task: impl Into<String>, device_serial: String, config: &AppConfig) -> VlaAgent {
    let api_key = config::resolve_api_key(config);
    let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiChatProvider::new(
        config.llm.api_base.clone(),
        api_key,
    ));

    let channel = Arc::new(AdbChannel::new(Some(device_serial)));
    let tools = DeviceTools::new(channel);

    let perception = Perception::new(
        tools.clone(),
        provider.clone(),
        (&config.llm.vision).into(),
        config.image.clone(),
        config.screenshots.clone(),
    );
    let planner = LlmPlanner::new(provider, (&config.llm.planner).into());
    let executor = Executor::new(tools);

    VlaAgent::new(
        task,
        config.agent.clone(),
        Box::new(perception),
        Box::new(planner),
        Box::new(executor),
    )
}
