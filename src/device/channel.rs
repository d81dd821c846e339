use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{PilotError, PilotResult};

/// Result of one device command. Failures are encoded, never raised:
/// timeouts and spawn errors come back as `success = false` with the
/// explanation in `stderr`, so callers have a single contract to handle.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Command channel to a device. The ADB implementation below is the real
/// one; tests substitute fakes that record the argument lists they see.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    async fn run(&self, args: &[&str], timeout: Duration) -> CmdOutput;
}

pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel backed by the `adb` binary, optionally pinned to one serial.
#[derive(Debug, Clone)]
pub struct AdbChannel {
    serial: Option<String>,
}

impl AdbChannel {
    pub fn new(serial: Option<String>) -> Self {
        Self { serial }
    }
}

#[async_trait]
impl DeviceChannel for AdbChannel {
    async fn run(&self, args: &[&str], timeout: Duration) -> CmdOutput {
        let mut cmd = Command::new("adb");
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(args);
        cmd.kill_on_drop(true);

        tracing::trace!(?args, serial = ?self.serial, "running adb");

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => CmdOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
            Ok(Err(e)) => CmdOutput::failure(e.to_string()),
            Err(_) => CmdOutput::failure(format!("Command timed out after {}s", timeout.as_secs())),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub status: String,
}

/// Parse `adb devices` output (header line skipped).
pub fn parse_device_list(stdout: &str) -> Vec<DeviceInfo> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let status = parts.next()?;
            Some(DeviceInfo {
                serial: serial.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}

/// List connected devices via a serial-less channel.
pub async fn list_devices() -> Vec<DeviceInfo> {
    let channel = AdbChannel::new(None);
    let out = channel.run(&["devices"], DEFAULT_CMD_TIMEOUT).await;
    if !out.success {
        tracing::warn!(stderr = %out.stderr, "adb devices failed");
        return Vec::new();
    }
    parse_device_list(&out.stdout)
}

/// First device reporting status `device`, or an error when none is attached.
pub async fn detect_device() -> PilotResult<String> {
    list_devices()
        .await
        .into_iter()
        .find(|d| d.status == "device")
        .map(|d| d.serial)
        .ok_or_else(|| PilotError::Device("No Android device connected".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_list_skipping_header() {
        let stdout = "List of devices attached\nRSCR70FW19K\tdevice\nemulator-5554\toffline\n";
        let devices = parse_device_list(stdout);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "RSCR70FW19K");
        assert_eq!(devices[0].status, "device");
        assert_eq!(devices[1].status, "offline");
    }

    #[test]
    fn empty_list_yields_no_devices() {
        assert!(parse_device_list("List of devices attached\n").is_empty());
    }
}
