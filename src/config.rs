use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{TapScoutError, TapScoutResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path or name of the adb binary.
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    /// Device serial used when the caller does not name one.
    #[serde(default)]
    pub default_device: Option<String>,
    /// Where captured screenshots land before cleanup.
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            default_device: None,
            screenshot_dir: default_screenshot_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_command")]
    pub command: String,
    #[serde(default = "default_ocr_language")]
    pub language: String,
    /// Tesseract page segmentation mode; 11 = sparse text, fits scattered
    /// UI labels better than the document-oriented default.
    #[serde(default = "default_ocr_psm")]
    pub psm: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            language: default_ocr_language(),
            psm: default_ocr_psm(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Screenshots whose longer side exceeds this are downscaled before OCR
    /// and artifact rendering.
    #[serde(default = "default_max_image_dim")]
    pub max_image_dim: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self { max_image_dim: default_max_image_dim() }
    }
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_screenshot_dir() -> PathBuf {
    std::env::temp_dir().join("tapscout")
}

fn default_ocr_command() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_psm() -> u32 {
    11
}

fn default_max_image_dim() -> u32 {
    1024
}

fn resolve_config_path() -> TapScoutResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(TapScoutError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> TapScoutResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), adb = %config.device.adb_path, "config loaded");
    Ok(config)
}
