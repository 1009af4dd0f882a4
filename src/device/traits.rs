use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TapScoutResult;
use crate::locator::types::ScreenMetadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Collaborator seam for device I/O. The resolution engine only ever talks
/// to a device through this trait, so tests swap in canned bridges.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Execute a shell command on the device.
    async fn run_shell(&self, device: &str, command: &str) -> TapScoutResult<ShellOutput>;

    /// Capture the current screen to a local file and return its path.
    /// The caller owns the file and its cleanup.
    async fn capture_screenshot(&self, device: &str) -> TapScoutResult<PathBuf>;

    /// Raw accessibility tree markup for the current screen.
    async fn dump_accessibility_tree(&self, device: &str) -> TapScoutResult<String>;

    async fn screen_metadata(&self, device: &str) -> TapScoutResult<ScreenMetadata>;

    /// Package/activity currently in the foreground.
    async fn foreground_app(&self, device: &str) -> TapScoutResult<String> {
        let out = self
            .run_shell(device, "dumpsys window | grep mCurrentFocus")
            .await?;
        Ok(parse_focus_line(&out.stdout))
    }
}

/// Pull `package/activity` out of a `mCurrentFocus=Window{... u0
/// com.app/com.app.Main}` line. Unrecognized input maps to an empty string.
pub fn parse_focus_line(line: &str) -> String {
    line.split_whitespace()
        .filter(|token| token.contains('/'))
        .last()
        .map(|token| token.trim_end_matches('}').to_string())
        .unwrap_or_default()
}
