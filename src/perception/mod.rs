pub mod types;

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use image::imageops::FilterType;

use crate::config::{ImageConfig, ScreenshotConfig};
use crate::device::tools::{screenshot_path, DeviceTools};
use crate::errors::{PilotError, PilotResult};
use crate::llm::parse::{strip_code_fences, truncate_chars};
use crate::llm::provider::ChatProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::types::UIState;

const ANALYSIS_PROMPT: &str = "\
Analyze this Android screenshot and provide a structured analysis.

## Instructions
1. Identify the current app/screen name
2. Describe what is displayed on the screen
3. List ALL interactive UI elements you can see with their:
   - Type (button, input_field, checkbox, text, icon, link, etc.)
   - Visible text or label
   - Approximate center coordinates (x, y) based on screen position
   - Whether it appears clickable
4. Note any error messages or popups
5. List possible actions a user could take

## Response Format (JSON)
```json
{
    \"app_name\": \"Name of the app or screen\",
    \"screen_description\": \"Brief description of what's shown\",
    \"elements\": [
        {
            \"type\": \"button\",
            \"text\": \"Install\",
            \"x\": 540,
            \"y\": 1800,
            \"clickable\": true
        }
    ],
    \"error_message\": null,
    \"popup_visible\": false,
    \"available_actions\": [\"tap Install button\", \"scroll down\", \"go back\"]
}
```

Respond ONLY with valid JSON, no additional text.";

/// Perception boundary: the engine depends on this trait so loop tests
/// can run against canned screens.
#[async_trait]
pub trait Perceiver: Send + Sync {
    /// Capture a screenshot, returning the local path. A failing pull is a
    /// hard failure for the step.
    async fn capture_screenshot(&self) -> PilotResult<PathBuf>;

    /// Analyze a screenshot into a UIState. All failure modes are carried
    /// in-band as UIState fields; this never errors.
    async fn analyze_screenshot(&self, path: &Path, prompt_override: Option<&str>) -> UIState;
}

/// The "eyes" of the pipeline: screenshot via the device channel, visual
/// analysis via the vision model.
pub struct Perception {
    tools: DeviceTools,
    provider: Arc<dyn ChatProvider>,
    call: CallConfig,
    image: ImageConfig,
    screenshots: ScreenshotConfig,
}

impl Perception {
    pub fn new(
        tools: DeviceTools,
        provider: Arc<dyn ChatProvider>,
        call: CallConfig,
        image: ImageConfig,
        screenshots: ScreenshotConfig,
    ) -> Self {
        Self {
            tools,
            provider,
            call,
            image,
            screenshots,
        }
    }

    /// Read the image, downsample it to the configured bounds
    /// (aspect-preserving), re-encode as PNG, and base64 it as a data URI.
    fn encode_image(&self, path: &Path) -> PilotResult<String> {
        let img = image::open(path)?;

        let img = match (self.image.max_width, self.image.max_height) {
            (Some(max_w), Some(max_h)) if img.width() > max_w || img.height() > max_h => {
                img.resize(max_w, max_h, FilterType::Lanczos3)
            }
            _ => img,
        };

        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)?;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&buffer);
        Ok(format!("data:image/png;base64,{b64}"))
    }

    fn parse_vlm_response(&self, response: &str) -> UIState {
        let json_str = strip_code_fences(response);
        match serde_json::from_str::<UIState>(json_str) {
            Ok(mut state) => {
                state.raw_response = Some(response.to_string());
                state
            }
            Err(e) => {
                tracing::warn!(error = %e, "VLM response is not the expected JSON schema");
                UIState::degraded(
                    truncate_chars(response, 500),
                    "Failed to parse structured response",
                    Some(response.to_string()),
                )
            }
        }
    }
}

#[async_trait]
impl Perceiver for Perception {
    async fn capture_screenshot(&self) -> PilotResult<PathBuf> {
        let dir = self.screenshots.resolve_dir();
        let envelope = self.tools.screenshot(&dir).await;
        screenshot_path(&envelope).map_err(PilotError::Perception)
    }

    async fn analyze_screenshot(&self, path: &Path, prompt_override: Option<&str>) -> UIState {
        let data_uri = match self.encode_image(path) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "cannot read screenshot");
                return UIState::degraded(
                    format!("Cannot read screenshot: {e}"),
                    e.to_string(),
                    None,
                );
            }
        };

        let prompt = prompt_override.unwrap_or(ANALYSIS_PROMPT);
        let messages = vec![ChatMessage::user_with_image(data_uri, prompt)];

        match self.provider.chat(messages, &self.call).await {
            Ok(content) => self.parse_vlm_response(&content),
            Err(e) if e.is_timeout() => {
                tracing::warn!("VLM analysis timed out");
                UIState::degraded(
                    "VLM analysis timed out",
                    "Analysis timeout - screen may be complex",
                    None,
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "VLM analysis failed");
                UIState::degraded(format!("VLM analysis failed: {e}"), e.to_string(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::channel::{CmdOutput, DeviceChannel};
    use crate::perception::types::ElementType;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeProvider {
        response: Mutex<Option<PilotResult<String>>>,
    }

    impl FakeProvider {
        fn ok(content: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(Ok(content.to_string()))),
            })
        }

        fn timeout() -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(Err(PilotError::LlmTimeout(120)))),
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(Err(PilotError::LlmProvider(
                    "502 Bad Gateway".into(),
                )))),
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

    struct NullChannel;

    #[async_trait]
    impl DeviceChannel for NullChannel {
        async fn run(&self, _args: &[&str], _timeout: Duration) -> CmdOutput {
            CmdOutput::failure("not used in this test")
        }
    }

    fn perception_with(provider: Arc<dyn ChatProvider>) -> Perception {
        Perception::new(
            DeviceTools::new(Arc::new(NullChannel)),
            provider,
            CallConfig {
                model: "test".into(),
                temperature: 0.1,
                max_tokens: 100,
                timeout: Duration::from_secs(1),
            },
            ImageConfig::default(),
            ScreenshotConfig::default(),
        )
    }

    fn write_test_png(dir: &Path) -> PathBuf {
        let path = dir.join("screen.png");
        let img = image::RgbImage::new(4, 4);
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn timeout_yields_degraded_state_with_timeout_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_test_png(tmp.path());
        let perception = perception_with(FakeProvider::timeout());

        let state = perception.analyze_screenshot(&path, None).await;
        assert_eq!(state.app_name, "Unknown");
        assert!(state.error_message.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn provider_failure_is_carried_in_band() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_test_png(tmp.path());
        let perception = perception_with(FakeProvider::broken());

        let state = perception.analyze_screenshot(&path, None).await;
        assert_eq!(state.app_name, "Unknown");
        assert!(state.error_message.unwrap().contains("502"));
    }

    #[tokio::test]
    async fn fenced_response_parses_into_ui_state() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_test_png(tmp.path());
        let response = "```json\n{\"app_name\": \"Settings\", \"screen_description\": \"Main settings\", \"elements\": [{\"type\": \"button\", \"text\": \"Wi-Fi\", \"x\": 100, \"y\": 200, \"clickable\": true}], \"popup_visible\": false, \"available_actions\": []}\n```";
        let perception = perception_with(FakeProvider::ok(response));

        let state = perception.analyze_screenshot(&path, None).await;
        assert_eq!(state.app_name, "Settings");
        assert_eq!(state.elements.len(), 1);
        assert_eq!(state.elements[0].element_type, ElementType::Button);
        assert!(state.raw_response.is_some());
    }

    #[tokio::test]
    async fn unparseable_response_becomes_degraded_state() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_test_png(tmp.path());
        let perception =
            perception_with(FakeProvider::ok("I see a home screen with several icons."));

        let state = perception.analyze_screenshot(&path, None).await;
        assert_eq!(state.app_name, "Unknown");
        assert!(state
            .error_message
            .unwrap()
            .contains("Failed to parse structured response"));
        assert!(state.screen_description.contains("home screen"));
    }

    #[test]
    fn encode_downsamples_oversized_images() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.png");
        image::RgbImage::new(2160, 4800).save(&path).unwrap();

        let perception = perception_with(FakeProvider::ok(""));
        let data_uri = perception.encode_image(&path).unwrap();
        assert!(data_uri.starts_with("data:image/png;base64,"));

        let b64 = data_uri.trim_start_matches("data:image/png;base64,");
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(decoded.width() <= 1080);
        assert!(decoded.height() <= 2400);
    }
}
