/// adb-backed device bridge.
///
/// Every capability is plain `adb` plumbing: `shell` for commands,
/// `exec-out screencap` for screenshots, a `uiautomator dump` round-trip
/// for the accessibility tree, and `wm size`/`wm density` for metadata.
use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::DeviceConfig;
use crate::device::traits::{DeviceBridge, ShellOutput};
use crate::errors::{TapScoutError, TapScoutResult};
use crate::locator::types::ScreenMetadata;

const REMOTE_DUMP_PATH: &str = "/sdcard/tapscout-ui-dump.xml";

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)x(\d+)").expect("size pattern"))
}

fn density_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"density:\s*(\d+)").expect("density pattern"))
}

pub struct AdbBridge {
    adb_path: String,
    screenshot_dir: PathBuf,
}

impl AdbBridge {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            screenshot_dir: config.screenshot_dir.clone(),
        }
    }

    async fn exec(&self, args: &[&str]) -> TapScoutResult<std::process::Output> {
        let output = Command::new(&self.adb_path)
            .args(args)
            .output()
            .await
            .map_err(|e| TapScoutError::Device(format!("adb spawn failed: {e}")))?;
        Ok(output)
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn run_shell(&self, device: &str, command: &str) -> TapScoutResult<ShellOutput> {
        let output = self.exec(&["-s", device, "shell", command]).await?;
        let result = ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        tracing::debug!(device, command, exit_code = result.exit_code, "shell command finished");
        Ok(result)
    }

    async fn capture_screenshot(&self, device: &str) -> TapScoutResult<PathBuf> {
        let output = self.exec(&["-s", device, "exec-out", "screencap", "-p"]).await?;
        if !output.status.success() || output.stdout.is_empty() {
            return Err(TapScoutError::Device(format!(
                "screencap failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tokio::fs::create_dir_all(&self.screenshot_dir).await?;
        let path = self
            .screenshot_dir
            .join(format!("tapscout-{}.png", Uuid::new_v4()));
        tokio::fs::write(&path, &output.stdout).await?;
        tracing::debug!(device, path = %path.display(), bytes = output.stdout.len(), "screenshot captured");
        Ok(path)
    }

    async fn dump_accessibility_tree(&self, device: &str) -> TapScoutResult<String> {
        let dump = self
            .run_shell(device, &format!("uiautomator dump {REMOTE_DUMP_PATH}"))
            .await?;
        if dump.exit_code != 0 {
            return Err(TapScoutError::Device(format!(
                "uiautomator dump failed: {}",
                dump.stderr.trim()
            )));
        }

        let content = self
            .run_shell(device, &format!("cat {REMOTE_DUMP_PATH}"))
            .await?;
        // Leftover dumps on the device are harmless; removal is best-effort.
        let _ = self
            .run_shell(device, &format!("rm {REMOTE_DUMP_PATH}"))
            .await;

        if content.exit_code != 0 {
            return Err(TapScoutError::Device(format!(
                "reading accessibility dump failed: {}",
                content.stderr.trim()
            )));
        }
        Ok(content.stdout)
    }

    async fn screen_metadata(&self, device: &str) -> TapScoutResult<ScreenMetadata> {
        let size = self.run_shell(device, "wm size").await?;
        let caps = size_re().captures(&size.stdout).ok_or_else(|| {
            TapScoutError::Device(format!("unparseable wm size output: {}", size.stdout.trim()))
        })?;
        let width = caps[1].parse().unwrap_or(0);
        let height = caps[2].parse().unwrap_or(0);

        let density = self.run_shell(device, "wm density").await?;
        let density = density_re()
            .captures(&density.stdout)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(160);

        Ok(ScreenMetadata { width, height, density })
    }
}
