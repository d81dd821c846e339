use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::device::channel::{DeviceChannel, DEFAULT_CMD_TIMEOUT};
use crate::device::keycodes::keycode_for;

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(60);
const DEVICE_SCREENSHOT_PATH: &str = "/sdcard/droidpilot_screen.png";

/// Device-facing tool surface. Every operation returns the JSON envelope
/// `{success: bool, error?: str, ...payload}` that the executor (and the
/// broader tool surface) parses uniformly.
#[derive(Clone)]
pub struct DeviceTools {
    channel: Arc<dyn DeviceChannel>,
}

impl DeviceTools {
    pub fn new(channel: Arc<dyn DeviceChannel>) -> Self {
        Self { channel }
    }

    async fn shell_envelope(&self, args: &[&str], action: &str, payload: Value) -> Value {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        let out = self.channel.run(&full, DEFAULT_CMD_TIMEOUT).await;
        if !out.success {
            return json!({
                "success": false,
                "error": format!("{action} failed: {}", out.stderr),
            });
        }
        let mut envelope = json!({ "success": true, "action": action });
        if let (Some(obj), Some(extra)) = (envelope.as_object_mut(), payload.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        envelope
    }

    pub async fn tap(&self, x: i32, y: i32) -> Value {
        let (xs, ys) = (x.to_string(), y.to_string());
        self.shell_envelope(&["input", "tap", &xs, &ys], "tap", json!({"x": x, "y": y}))
            .await
    }

    pub async fn long_press(&self, x: i32, y: i32, duration_ms: u32) -> Value {
        // input swipe with identical endpoints acts as a press-and-hold
        let (xs, ys, d) = (x.to_string(), y.to_string(), duration_ms.to_string());
        self.shell_envelope(
            &["input", "swipe", &xs, &ys, &xs, &ys, &d],
            "long_press",
            json!({"x": x, "y": y, "duration_ms": duration_ms}),
        )
        .await
    }

    pub async fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: u32,
    ) -> Value {
        let (sx, sy, ex, ey, d) = (
            start_x.to_string(),
            start_y.to_string(),
            end_x.to_string(),
            end_y.to_string(),
            duration_ms.to_string(),
        );
        self.shell_envelope(
            &["input", "swipe", &sx, &sy, &ex, &ey, &d],
            "swipe",
            json!({
                "start_x": start_x, "start_y": start_y,
                "end_x": end_x, "end_y": end_y,
                "duration_ms": duration_ms,
            }),
        )
        .await
    }

    pub async fn drag(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: u32,
    ) -> Value {
        let (sx, sy, ex, ey, d) = (
            start_x.to_string(),
            start_y.to_string(),
            end_x.to_string(),
            end_y.to_string(),
            duration_ms.to_string(),
        );
        self.shell_envelope(
            &["input", "draganddrop", &sx, &sy, &ex, &ey, &d],
            "drag",
            json!({
                "start_x": start_x, "start_y": start_y,
                "end_x": end_x, "end_y": end_y,
                "duration_ms": duration_ms,
            }),
        )
        .await
    }

    pub async fn input_text(&self, text: &str) -> Value {
        let escaped = escape_input_text(text);
        self.shell_envelope(
            &["input", "text", &escaped],
            "input_text",
            json!({"text": text}),
        )
        .await
    }

    pub async fn press_key(&self, key: &str, longpress: bool) -> Value {
        let keycode = keycode_for(key);
        let mut args = vec!["input", "keyevent"];
        if longpress {
            args.push("--longpress");
        }
        args.push(&keycode);
        self.shell_envelope(&args, "press_key", json!({"keycode": &keycode}))
            .await
    }

    /// Capture a screenshot on the device, pull it into `output_dir`, and
    /// clean up the device-side copy. Filename carries a millisecond
    /// timestamp to avoid collisions.
    pub async fn screenshot(&self, output_dir: &Path) -> Value {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            return json!({"success": false, "error": format!("Cannot create {}: {e}", output_dir.display())});
        }
        let local_path = output_dir.join(format!(
            "screen_{}.png",
            chrono::Utc::now().timestamp_millis()
        ));

        let cap = self
            .channel
            .run(
                &["shell", "screencap", "-p", DEVICE_SCREENSHOT_PATH],
                SCREENSHOT_TIMEOUT,
            )
            .await;
        if !cap.success {
            return json!({"success": false, "error": format!("screencap failed: {}", cap.stderr)});
        }

        let local = local_path.to_string_lossy().to_string();
        let pull = self
            .channel
            .run(&["pull", DEVICE_SCREENSHOT_PATH, &local], SCREENSHOT_TIMEOUT)
            .await;
        if !pull.success {
            return json!({"success": false, "error": format!("pull failed: {}", pull.stderr)});
        }

        // Best-effort cleanup; a stale temp file on the device is harmless.
        let _ = self
            .channel
            .run(&["shell", "rm", DEVICE_SCREENSHOT_PATH], DEFAULT_CMD_TIMEOUT)
            .await;

        json!({"success": true, "path": local})
    }

    /// Launch an app by package name via monkey (works without knowing the
    /// activity name).
    pub async fn start_app(&self, package: &str) -> Value {
        self.shell_envelope(
            &[
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ],
            "start_app",
            json!({"package": package}),
        )
        .await
    }

    pub async fn stop_app(&self, package: &str) -> Value {
        self.shell_envelope(
            &["am", "force-stop", package],
            "stop_app",
            json!({"package": package}),
        )
        .await
    }

    pub async fn list_packages(&self) -> Value {
        let out = self
            .channel
            .run(&["shell", "pm", "list", "packages"], DEFAULT_CMD_TIMEOUT)
            .await;
        if !out.success {
            return json!({"success": false, "error": format!("pm list packages failed: {}", out.stderr)});
        }
        let packages: Vec<&str> = out
            .stdout
            .lines()
            .filter_map(|l| l.trim().strip_prefix("package:"))
            .collect();
        let count = packages.len();
        json!({"success": true, "packages": packages, "count": count})
    }

    pub async fn battery(&self) -> Value {
        let out = self
            .channel
            .run(&["shell", "dumpsys", "battery"], DEFAULT_CMD_TIMEOUT)
            .await;
        if !out.success {
            return json!({"success": false, "error": format!("dumpsys battery failed: {}", out.stderr)});
        }
        let mut info = serde_json::Map::new();
        for line in out.stdout.lines() {
            if let Some((key, value)) = line.trim().split_once(':') {
                info.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
            }
        }
        json!({"success": true, "battery": info})
    }
}

/// Escape text for `adb shell input text`: spaces become `%s`, shell
/// metacharacters get backslash-escaped.
fn escape_input_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            ' ' => escaped.push_str("%s"),
            '\'' | '"' | '\\' | '&' | '|' | ';' | '$' | '`' | '(' | ')' | '<' | '>' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Extract the local path from a screenshot envelope, or the error text.
pub fn screenshot_path(envelope: &Value) -> Result<PathBuf, String> {
    if envelope["success"].as_bool().unwrap_or(false) {
        envelope["path"]
            .as_str()
            .map(PathBuf::from)
            .ok_or_else(|| "screenshot envelope missing path".to_string())
    } else {
        Err(envelope["error"]
            .as_str()
            .unwrap_or("Screenshot failed")
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::channel::CmdOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every argument list and replays canned outputs.
    struct FakeChannel {
        calls: Mutex<Vec<Vec<String>>>,
        outputs: Mutex<Vec<CmdOutput>>,
    }

    impl FakeChannel {
        fn ok(stdout: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outputs: Mutex::new(vec![CmdOutput {
                    success: true,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                }]),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceChannel for FakeChannel {
        async fn run(&self, args: &[&str], _timeout: Duration) -> CmdOutput {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(|s| s.to_string()).collect());
            let mut outputs = self.outputs.lock().unwrap();
            if outputs.len() > 1 {
                outputs.remove(0)
            } else {
                outputs[0].clone()
            }
        }
    }

    fn tools_with(channel: Arc<FakeChannel>) -> DeviceTools {
        DeviceTools::new(channel)
    }

    #[tokio::test]
    async fn tap_builds_input_tap_command() {
        let channel = Arc::new(FakeChannel::ok(""));
        let tools = tools_with(channel.clone());
        let envelope = tools.tap(540, 1200).await;

        assert_eq!(envelope["success"], true);
        assert_eq!(
            channel.calls()[0],
            vec!["shell", "input", "tap", "540", "1200"]
        );
    }

    #[tokio::test]
    async fn failed_command_reports_error_envelope() {
        let channel = Arc::new(FakeChannel {
            calls: Mutex::new(Vec::new()),
            outputs: Mutex::new(vec![CmdOutput::failure("device offline")]),
        });
        let tools = tools_with(channel);
        let envelope = tools.tap(1, 2).await;

        assert_eq!(envelope["success"], false);
        assert!(envelope["error"].as_str().unwrap().contains("device offline"));
    }

    #[tokio::test]
    async fn input_text_escapes_spaces_and_metacharacters() {
        let channel = Arc::new(FakeChannel::ok(""));
        let tools = tools_with(channel.clone());
        tools.input_text("hello world & co").await;

        let call = &channel.calls()[0];
        assert_eq!(call[2], "text");
        assert_eq!(call[3], "hello%sworld%s\\&%sco");
    }

    #[tokio::test]
    async fn press_key_translates_friendly_names() {
        let channel = Arc::new(FakeChannel::ok(""));
        let tools = tools_with(channel.clone());
        tools.press_key("back", false).await;

        assert_eq!(
            channel.calls()[0],
            vec!["shell", "input", "keyevent", "KEYCODE_BACK"]
        );
    }

    #[tokio::test]
    async fn list_packages_strips_prefix() {
        let channel = Arc::new(FakeChannel::ok(
            "package:com.android.chrome\npackage:com.whatsapp",
        ));
        let tools = tools_with(channel);
        let envelope = tools.list_packages().await;

        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["count"], 2);
        assert_eq!(envelope["packages"][1], "com.whatsapp");
    }

    #[tokio::test]
    async fn battery_parses_key_value_lines() {
        let channel = Arc::new(FakeChannel::ok(
            "Current Battery Service state:\n  level: 87\n  status: 2",
        ));
        let tools = tools_with(channel);
        let envelope = tools.battery().await;

        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["battery"]["level"], "87");
    }

    #[test]
    fn escape_leaves_plain_text_alone() {
        assert_eq!(escape_input_text("hello"), "hello");
    }
}
