/// OCR bridge over the external `tesseract` binary.
///
/// The engine is process-wide: the first recognition probes and caches the
/// binary, later calls reuse it, and concurrent calls serialize on the
/// guard (recognition is not assumed re-entrant). `terminate` releases the
/// engine; callers invoke it at shutdown, never between requests.
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::OcrConfig;
use crate::errors::{TapScoutError, TapScoutResult};
use crate::locator::types::{Bounds, OcrElement, OcrResult};

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Word-level recognition over an image file. Failures propagate from
    /// this layer; the resolution engine decides how to absorb them.
    async fn extract_text(&self, image: &Path) -> TapScoutResult<Vec<OcrResult>>;

    /// Release the recognition engine.
    async fn terminate(&self);
}

struct Engine {
    command: String,
    language: String,
    psm: u32,
}

static ENGINE: Mutex<Option<Engine>> = Mutex::const_new(None);

impl Engine {
    async fn start(config: &OcrConfig) -> TapScoutResult<Self> {
        let output = Command::new(&config.command)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                TapScoutError::Ocr(format!("{} is not available: {e}", config.command))
            })?;
        if !output.status.success() {
            return Err(TapScoutError::Ocr(format!(
                "{} --version exited with {}",
                config.command, output.status
            )));
        }
        tracing::info!(command = %config.command, language = %config.language, "OCR engine initialized");
        Ok(Self {
            command: config.command.clone(),
            language: config.language.clone(),
            psm: config.psm,
        })
    }

    async fn recognize(&self, image: &Path) -> TapScoutResult<Vec<OcrResult>> {
        let output = Command::new(&self.command)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--psm", &self.psm.to_string()])
            .arg("tsv")
            .output()
            .await
            .map_err(|e| TapScoutError::Ocr(format!("recognition spawn failed: {e}")))?;
        if !output.status.success() {
            return Err(TapScoutError::Ocr(format!(
                "recognition exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(words = words.len(), image = %image.display(), "OCR complete");
        Ok(words)
    }
}

/// Tesseract-backed recognizer. Cheap to clone around; the heavy state
/// lives in the process-wide engine cell.
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self { config: config.clone() }
    }
}

#[async_trait]
impl TextRecognizer for TesseractOcr {
    async fn extract_text(&self, image: &Path) -> TapScoutResult<Vec<OcrResult>> {
        let mut guard = ENGINE.lock().await;
        if guard.is_none() {
            *guard = Some(Engine::start(&self.config).await?);
        }
        match guard.as_ref() {
            Some(engine) => engine.recognize(image).await,
            None => Err(TapScoutError::Ocr("engine unavailable".into())),
        }
    }

    async fn terminate(&self) {
        let mut guard = ENGINE.lock().await;
        if guard.take().is_some() {
            tracing::debug!("OCR engine terminated");
        }
    }
}

/// Parse tesseract TSV output, keeping word-level rows (level 5) with
/// non-empty text and non-negative confidence. Confidence is normalized
/// from the engine's 0-100 scale to [0, 1].
pub fn parse_tsv(tsv: &str) -> Vec<OcrResult> {
    let mut out = Vec::new();
    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }
        let left: i32 = cols[6].parse().unwrap_or(0);
        let top: i32 = cols[7].parse().unwrap_or(0);
        let width: i32 = cols[8].parse().unwrap_or(0);
        let height: i32 = cols[9].parse().unwrap_or(0);
        out.push(OcrResult {
            text: text.to_string(),
            confidence: (conf / 100.0).clamp(0.0, 1.0),
            bounds: Bounds::new(left, top, left + width, top + height),
        });
    }
    out
}

/// Case-insensitive substring search over recognition results. Matches get
/// stable 0-based indices in input order.
pub fn search_text(results: &[OcrResult], term: &str) -> Vec<OcrElement> {
    let needle = term.to_lowercase();
    results
        .iter()
        .filter(|r| r.text.to_lowercase().contains(&needle))
        .enumerate()
        .map(|(index, r)| OcrElement {
            index,
            text: r.text.clone(),
            confidence: r.confidence,
            bounds: r.bounds,
            bounds_label: r.bounds.label(),
            center: r.bounds.center(),
        })
        .collect()
}
