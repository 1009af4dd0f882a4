/// Tiered resolution engine.
///
/// A selector enters, tiers are attempted strictly in order, and the first
/// tier producing a usable result terminates the chain:
///
/// 1. accessibility exact/contains match        (high confidence)
/// 2. resource-id icon pattern match            (high)
/// 3. OCR over a screenshot                     (high)
/// 4. visual candidate crops, caller chooses    (medium)
/// 5. numbered grid overlay, caller chooses     (low)
///
/// Tiers 3-5 share one screenshot capture; the capture is a scoped token
/// whose files are removed on every exit path unless the caller asked to
/// retain the artifact. A tier finding nothing is a normal transition, not
/// an error; collaborator failures propagate distinctly.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use image::DynamicImage;
use tokio::sync::Mutex;

use crate::config::LocatorConfig;
use crate::device::traits::DeviceBridge;
use crate::errors::{TapScoutError, TapScoutResult};
use crate::locator::ocr::TextRecognizer;
use crate::locator::types::{
    AccessibilityNode, Confidence, DebugTrace, ElementSummary, FindOptions, FindResult,
    FoundElement, ProximityInfo, Selector, Source, VisualFallback,
};
use crate::locator::{candidates, grid, icons, ocr, proximity, scaling, tree};

/// Scale relationship of the most recent capture, kept so a later grid
/// refinement can be computed against the image the caller actually saw.
#[derive(Debug, Clone, Copy)]
struct ScaleState {
    factor: f64,
    image_w: u32,
    image_h: u32,
}

/// Scoped screenshot shared by tiers 3-5 of one request. Dropping it
/// removes the backing files unless `retain` was called.
struct Capture {
    path: PathBuf,
    scaled_path: Option<PathBuf>,
    image: DynamicImage,
    factor: f64,
    retained: bool,
}

impl Capture {
    /// File handed to the OCR engine: the downscaled copy when one exists.
    fn ocr_path(&self) -> &Path {
        self.scaled_path.as_deref().unwrap_or(&self.path)
    }

    fn retain(&mut self) {
        self.retained = true;
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if self.retained {
            tracing::debug!(path = %self.path.display(), "screenshot retained for caller");
            return;
        }
        for path in std::iter::once(&self.path).chain(self.scaled_path.iter()) {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::debug!(path = %path.display(), error = %e, "screenshot cleanup skipped");
            }
        }
    }
}

pub struct Locator {
    bridge: Arc<dyn DeviceBridge>,
    ocr: Arc<dyn TextRecognizer>,
    max_image_dim: u32,
    scale_state: Mutex<Option<ScaleState>>,
    last_elements: Mutex<Vec<FoundElement>>,
}

impl Locator {
    pub fn new(
        bridge: Arc<dyn DeviceBridge>,
        ocr: Arc<dyn TextRecognizer>,
        config: &LocatorConfig,
    ) -> Self {
        Self {
            bridge,
            ocr,
            max_image_dim: config.max_image_dim,
            scale_state: Mutex::new(None),
            last_elements: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a selector to screen coordinates, degrading tier by tier.
    pub async fn find(
        &self,
        device: &str,
        selector: &Selector,
        options: &FindOptions,
    ) -> TapScoutResult<FindResult> {
        validate(selector, options)?;
        let mut trace: Vec<String> = Vec::new();

        // A complete cell+position pair means the caller is acting on a
        // previously returned grid image; it bypasses the chain entirely.
        if let (Some(cell), Some(position)) = (options.grid_cell, options.grid_position) {
            return self.resolve_grid_refinement(device, cell, position, options, trace).await;
        }

        let raw = self.bridge.dump_accessibility_tree(device).await?;
        let forest = tree::parse_tree(&raw);
        trace.push(format!("tier 1: tree with {} nodes", tree::flatten(&forest).len()));

        // Tier 1: live accessibility query
        let matches = tree::query(&forest, selector);
        if !matches.is_empty() {
            trace.push(format!("tier 1: {} selector matches", matches.len()));
            let mut result = FindResult::new(Source::Accessibility, 1, Confidence::High);
            result.elements = matches
                .iter()
                .map(|n| FoundElement::Accessibility(ElementSummary::from(n)))
                .collect();
            return self.finish(device, selector, result, &forest, options, trace).await;
        }

        let Some(term) = selector.free_text().map(str::to_owned) else {
            // Resource-id / class-only selectors have no text to feed tiers
            // 2-4; miss means empty, or a generic snapshot when opted in.
            trace.push("tier 1 empty; no free text, tiers 2-4 skipped".into());
            if options.include_visual_fallback {
                return self.visual_snapshot(device, options, trace).await;
            }
            let result = FindResult::new(Source::Accessibility, 1, Confidence::Low);
            return self.complete(result, trace, options).await;
        };

        // Tier 2: resource-id pattern families over the same tree
        if let Some(patterns) = icons::match_icon_pattern(&term) {
            let hits: Vec<&AccessibilityNode> = tree::flatten(&forest)
                .into_iter()
                .filter(|n| icons::matches_resource_id(&n.resource_id, patterns))
                .collect();
            trace.push(format!("tier 2: {} resource-id pattern matches", hits.len()));
            if !hits.is_empty() {
                let mut result = FindResult::new(Source::Accessibility, 2, Confidence::High);
                result.elements = hits
                    .into_iter()
                    .map(|n| FoundElement::Accessibility(ElementSummary::from(n)))
                    .collect();
                return self.finish(device, selector, result, &forest, options, trace).await;
            }
        } else {
            trace.push("tier 2: query names no icon family".into());
        }

        // Tier 3: OCR over one capture, shared with tiers 4 and 5
        let mut capture = self.acquire_capture(device).await?;
        if options.include_visual_fallback {
            capture.retain();
        }
        let words = match self.ocr.extract_text(capture.ocr_path()).await {
            Ok(words) => words,
            Err(e) => {
                tracing::warn!(error = %e, "OCR failed, treated as zero matches");
                trace.push(format!("tier 3: OCR error absorbed: {e}"));
                Vec::new()
            }
        };
        let hits = ocr::search_text(&words, &term);
        trace.push(format!("tier 3: {} OCR matches of {} words", hits.len(), words.len()));
        if !hits.is_empty() {
            let factor = capture.factor;
            let mut result = FindResult::new(Source::Ocr, 3, Confidence::High);
            result.elements = hits
                .into_iter()
                .map(|mut el| {
                    el.center = scaling::to_device_space(el.center.x, el.center.y, factor);
                    FoundElement::Ocr(el)
                })
                .collect();
            return self.finish(device, selector, result, &forest, options, trace).await;
        }

        // Tier 4: unlabeled icon candidates, cropped from the same capture
        let flat = tree::flatten(&forest);
        let icon_nodes = candidates::filter_icon_candidates(&flat);
        if !icon_nodes.is_empty() {
            let crops = candidates::crop_candidates(&capture.image, &icon_nodes, capture.factor)?;
            if !crops.is_empty() {
                trace.push(format!("tier 4: {} visual candidates", crops.len()));
                let mut result = FindResult::new(Source::Visual, 4, Confidence::Medium);
                result.candidates = Some(crops);
                return self.complete(result, trace, options).await;
            }
        }
        trace.push("tier 4: no visual candidates".into());

        // Tier 5: the grid always has something to offer
        let overlay = grid::create_grid_overlay(&capture.image)?;
        trace.push("tier 5: grid overlay rendered".into());
        let mut result = FindResult::new(Source::Grid, 5, Confidence::Low);
        result.grid_image = Some(base64::engine::general_purpose::STANDARD.encode(&overlay));
        result.grid_positions =
            Some(grid::POSITION_LABELS.iter().map(|s| s.to_string()).collect());
        self.complete(result, trace, options).await
    }

    /// Advisory lookup into the last-returned element list. The screen may
    /// have changed since that result; treat the element as a hint.
    pub async fn element_at(&self, index: usize) -> Option<FoundElement> {
        self.last_elements.lock().await.get(index).cloned()
    }

    /// Release shared resources (the OCR engine). Call once at shutdown.
    pub async fn shutdown(&self) {
        self.ocr.terminate().await;
    }

    async fn resolve_grid_refinement(
        &self,
        device: &str,
        cell: u32,
        position: u32,
        options: &FindOptions,
        mut trace: Vec<String>,
    ) -> TapScoutResult<FindResult> {
        let state = *self.scale_state.lock().await;
        let (w, h, factor) = match state {
            Some(s) => {
                trace.push(format!(
                    "grid refinement against prior image {}x{}",
                    s.image_w, s.image_h
                ));
                (s.image_w, s.image_h, s.factor)
            }
            None => {
                let meta = self.bridge.screen_metadata(device).await?;
                trace.push(format!(
                    "grid refinement against device screen {}x{}",
                    meta.width, meta.height
                ));
                (meta.width, meta.height, 1.0)
            }
        };

        let bounds = grid::grid_cell_bounds(cell, w, h)?;
        let point = grid::position_coordinates(position, &bounds)?;
        let point = scaling::to_device_space(point.x, point.y, factor);

        let mut result = FindResult::new(Source::Grid, 5, Confidence::Low);
        result.elements = vec![FoundElement::GridPoint {
            cell,
            position,
            x: point.x,
            y: point.y,
        }];
        self.complete(result, trace, options).await
    }

    /// Generic fallback for selectors that cannot degrade through OCR:
    /// screenshot, screen metadata, and the foreground app.
    async fn visual_snapshot(
        &self,
        device: &str,
        options: &FindOptions,
        mut trace: Vec<String>,
    ) -> TapScoutResult<FindResult> {
        let mut capture = self.acquire_capture(device).await?;
        let screen = self.bridge.screen_metadata(device).await?;
        let foreground_app = self.bridge.foreground_app(device).await?;

        let screenshot = if options.include_base64 {
            let mut png = Vec::new();
            capture
                .image
                .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
                .map_err(|e| TapScoutError::Image(format!("snapshot PNG encode: {e}")))?;
            Some(base64::engine::general_purpose::STANDARD.encode(&png))
        } else {
            None
        };

        capture.retain();
        trace.push("visual snapshot fallback".into());
        let mut result = FindResult::new(Source::Visual, 4, Confidence::Low);
        result.visual_fallback = Some(VisualFallback {
            screenshot,
            screenshot_path: capture.path.display().to_string(),
            screen,
            foreground_app,
        });
        self.complete(result, trace, options).await
    }

    async fn acquire_capture(&self, device: &str) -> TapScoutResult<Capture> {
        let path = self.bridge.capture_screenshot(device).await?;
        let bytes = tokio::fs::read(&path).await?;
        let full = image::load_from_memory(&bytes)
            .map_err(|e| TapScoutError::Screenshot(format!("decode {}: {e}", path.display())))?;

        let (w, h) = (full.width(), full.height());
        let factor = scaling::scale_factor(w, h, self.max_image_dim);

        let (image, scaled_path) = if factor > 1.0 {
            let sw = ((w as f64 / factor).round() as u32).max(1);
            let sh = ((h as f64 / factor).round() as u32).max(1);
            let scaled = full.resize_exact(sw, sh, image::imageops::FilterType::Triangle);
            let scaled_file = path.with_extension("scaled.png");
            scaled
                .save(&scaled_file)
                .map_err(|e| TapScoutError::Screenshot(format!("write scaled image: {e}")))?;
            (scaled, Some(scaled_file))
        } else {
            (full, None)
        };

        *self.scale_state.lock().await = Some(ScaleState {
            factor,
            image_w: image.width(),
            image_h: image.height(),
        });
        tracing::debug!(factor, width = image.width(), height = image.height(), "capture ready");

        Ok(Capture { path, scaled_path, image, factor, retained: false })
    }

    /// Resolve the anchor's own location with the same chain, restricted to
    /// tiers 1-3; tiers 4 and 5 select nothing automatically, so they
    /// cannot anchor.
    async fn resolve_anchor(
        &self,
        device: &str,
        anchor: &str,
        forest: &[AccessibilityNode],
    ) -> TapScoutResult<Option<crate::locator::types::Point>> {
        let selector = Selector { text: Some(anchor.to_string()), ..Selector::default() };
        let matches = tree::query(forest, &selector);
        if let Some(node) = matches.first() {
            return Ok(Some(node.center()));
        }

        if let Some(patterns) = icons::match_icon_pattern(anchor) {
            let hit = tree::flatten(forest)
                .into_iter()
                .find(|n| icons::matches_resource_id(&n.resource_id, patterns));
            if let Some(node) = hit {
                return Ok(Some(node.center()));
            }
        }

        let capture = self.acquire_capture(device).await?;
        let words = match self.ocr.extract_text(capture.ocr_path()).await {
            Ok(words) => words,
            Err(e) => {
                tracing::warn!(error = %e, "anchor OCR failed, anchor unresolved");
                Vec::new()
            }
        };
        let hits = ocr::search_text(&words, anchor);
        Ok(hits
            .first()
            .map(|el| scaling::to_device_space(el.center.x, el.center.y, capture.factor)))
    }

    /// Apply anchor ranking when requested, then complete the result.
    async fn finish(
        &self,
        device: &str,
        selector: &Selector,
        mut result: FindResult,
        forest: &[AccessibilityNode],
        options: &FindOptions,
        mut trace: Vec<String>,
    ) -> TapScoutResult<FindResult> {
        if let Some(anchor_text) = selector.nearest_to.as_deref() {
            match self.resolve_anchor(device, anchor_text, forest).await? {
                Some(anchor_center) => {
                    let elements = std::mem::take(&mut result.elements);
                    let (ranked, method) =
                        proximity::rank_by_proximity(elements, anchor_center, forest);
                    trace.push(format!(
                        "anchor at ({},{}) ranked {} elements via {:?}",
                        anchor_center.x,
                        anchor_center.y,
                        ranked.len(),
                        method
                    ));
                    result.elements = ranked;
                    result.sorted_by_proximity_to = Some(ProximityInfo {
                        anchor: anchor_text.to_string(),
                        anchor_center,
                        method,
                    });
                }
                None => {
                    trace.push(format!("anchor \"{anchor_text}\" unresolved"));
                    result.warning = Some(format!(
                        "anchor \"{anchor_text}\" could not be located; ordering unchanged"
                    ));
                }
            }
        }
        self.complete(result, trace, options).await
    }

    async fn complete(
        &self,
        mut result: FindResult,
        trace: Vec<String>,
        options: &FindOptions,
    ) -> TapScoutResult<FindResult> {
        *self.last_elements.lock().await = result.elements.clone();
        if options.debug {
            result.debug = Some(DebugTrace { steps: trace });
        }
        tracing::info!(
            tier = result.tier,
            elements = result.elements.len(),
            source = ?result.source,
            "resolution finished"
        );
        Ok(result)
    }
}

/// Reject malformed requests before any device I/O happens.
fn validate(selector: &Selector, options: &FindOptions) -> TapScoutResult<()> {
    match (options.grid_cell, options.grid_position) {
        (Some(cell), Some(position)) => {
            if !(1..=grid::GRID_CELLS).contains(&cell) {
                return Err(TapScoutError::Validation(format!(
                    "grid cell {cell} is out of range; pick a cell between 1 and {} from the grid image",
                    grid::GRID_CELLS
                )));
            }
            if !(1..=5).contains(&position) {
                return Err(TapScoutError::Validation(format!(
                    "grid position {position} is out of range; pick 1-5 ({})",
                    grid::POSITION_LABELS.join(", ")
                )));
            }
            Ok(())
        }
        (Some(_), None) => Err(TapScoutError::Validation(
            "grid_position must accompany grid_cell; pick 1-5 (top-left, top-right, center, bottom-left, bottom-right)"
                .into(),
        )),
        (None, Some(_)) => Err(TapScoutError::Validation(
            "grid_cell must accompany grid_position; pick a cell 1-24 from the grid image".into(),
        )),
        (None, None) => {
            if selector.has_criteria() {
                Ok(())
            } else {
                Err(TapScoutError::Validation(
                    "selector needs at least one of text, text_contains, resource_id, class_name"
                        .into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::device::traits::ShellOutput;
    use crate::locator::types::{OcrResult, Point, ProximityMethod, ScreenMetadata};

    const EMPTY_XML: &str = r#"<hierarchy rotation="0"></hierarchy>"#;

    const SUBMIT_XML: &str = r#"<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" clickable="false" focusable="false" bounds="[0,0][1080,1920]">
    <node index="0" text="Submit" resource-id="com.app:id/submit" class="android.widget.Button" content-desc="" clickable="true" focusable="true" bounds="[100,100][300,200]"/>
  </node>
</hierarchy>"#;

    const OVERFLOW_XML: &str = r#"<hierarchy rotation="0">
  <node index="0" text="" resource-id="com.app:id/overflow_button" class="android.widget.ImageView" content-desc="" clickable="true" focusable="true" bounds="[900,100][1000,200]"/>
</hierarchy>"#;

    const ROWS_XML: &str = r#"<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" clickable="false" focusable="false" bounds="[0,0][1080,1920]">
    <node index="0" text="" resource-id="" class="android.view.ViewGroup" content-desc="" clickable="false" focusable="false" bounds="[0,0][1080,200]">
      <node index="0" text="Item A" resource-id="" class="android.widget.TextView" content-desc="" clickable="false" focusable="false" bounds="[40,60][400,140]"/>
      <node index="1" text="Copy" resource-id="" class="android.widget.Button" content-desc="" clickable="true" focusable="true" bounds="[900,60][1040,140]"/>
    </node>
    <node index="1" text="" resource-id="" class="android.view.ViewGroup" content-desc="" clickable="false" focusable="false" bounds="[0,200][1080,400]">
      <node index="0" text="Item B" resource-id="" class="android.widget.TextView" content-desc="" clickable="false" focusable="false" bounds="[40,260][400,340]"/>
      <node index="1" text="Copy" resource-id="" class="android.widget.Button" content-desc="" clickable="true" focusable="true" bounds="[900,260][1040,340]"/>
    </node>
  </node>
</hierarchy>"#;

    fn icons_xml(count: usize) -> String {
        let mut nodes = String::new();
        for i in 0..count {
            let top = 100 + 150 * i as i32;
            nodes.push_str(&format!(
                r#"<node index="{i}" text="" resource-id="" class="android.widget.ImageButton" content-desc="" clickable="true" focusable="true" bounds="[100,{top}][148,{bottom}]"/>"#,
                bottom = top + 48,
            ));
        }
        format!(r#"<hierarchy rotation="0">{nodes}</hierarchy>"#)
    }

    struct MockBridge {
        xml: String,
        fail_dump: bool,
        tree_calls: AtomicUsize,
        screenshot_calls: AtomicUsize,
        metadata_calls: AtomicUsize,
        last_screenshot: StdMutex<Option<PathBuf>>,
    }

    impl MockBridge {
        fn new(xml: &str) -> Self {
            Self {
                xml: xml.to_string(),
                fail_dump: false,
                tree_calls: AtomicUsize::new(0),
                screenshot_calls: AtomicUsize::new(0),
                metadata_calls: AtomicUsize::new(0),
                last_screenshot: StdMutex::new(None),
            }
        }

        fn failing_dump() -> Self {
            let mut bridge = Self::new(EMPTY_XML);
            bridge.fail_dump = true;
            bridge
        }

        fn tree_count(&self) -> usize {
            self.tree_calls.load(Ordering::SeqCst)
        }

        fn screenshot_count(&self) -> usize {
            self.screenshot_calls.load(Ordering::SeqCst)
        }

        fn last_screenshot(&self) -> Option<PathBuf> {
            self.last_screenshot.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceBridge for MockBridge {
        async fn run_shell(&self, _device: &str, _command: &str) -> TapScoutResult<ShellOutput> {
            Ok(ShellOutput {
                stdout: "mCurrentFocus=Window{1a2b u0 com.demo/com.demo.Main}".into(),
                stderr: String::new(),
                exit_code: 0,
            })
        }

        async fn capture_screenshot(&self, _device: &str) -> TapScoutResult<PathBuf> {
            self.screenshot_calls.fetch_add(1, Ordering::SeqCst);
            let path =
                std::env::temp_dir().join(format!("tapscout-test-{}.png", Uuid::new_v4()));
            let img = image::RgbaImage::from_pixel(1080, 1920, image::Rgba([24, 24, 24, 255]));
            image::DynamicImage::ImageRgba8(img)
                .save(&path)
                .map_err(|e| TapScoutError::Screenshot(e.to_string()))?;
            *self.last_screenshot.lock().unwrap() = Some(path.clone());
            Ok(path)
        }

        async fn dump_accessibility_tree(&self, _device: &str) -> TapScoutResult<String> {
            self.tree_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_dump {
                return Err(TapScoutError::Device("uiautomator crashed".into()));
            }
            Ok(self.xml.clone())
        }

        async fn screen_metadata(&self, _device: &str) -> TapScoutResult<ScreenMetadata> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ScreenMetadata { width: 1080, height: 1920, density: 420 })
        }
    }

    struct MockOcr {
        words: Vec<OcrResult>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl MockOcr {
        fn empty() -> Self {
            Self { words: Vec::new(), fail: false, calls: AtomicUsize::new(0) }
        }

        fn with_words(words: Vec<OcrResult>) -> Self {
            Self { words, fail: false, calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            Self { words: Vec::new(), fail: true, calls: AtomicUsize::new(0) }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextRecognizer for MockOcr {
        async fn extract_text(&self, _image: &Path) -> TapScoutResult<Vec<OcrResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TapScoutError::Ocr("recognizer exploded".into()));
            }
            Ok(self.words.clone())
        }

        async fn terminate(&self) {}
    }

    fn continue_word() -> OcrResult {
        OcrResult {
            text: "Continue".into(),
            confidence: 0.96,
            bounds: crate::locator::types::Bounds::new(100, 200, 180, 240),
        }
    }

    fn build(bridge: Arc<MockBridge>, ocr: Arc<MockOcr>) -> Locator {
        Locator::new(bridge, ocr, &LocatorConfig::default())
    }

    fn text_selector(text: &str) -> Selector {
        Selector { text: Some(text.into()), ..Selector::default() }
    }

    fn remove_capture_files(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("scaled.png"));
    }

    #[tokio::test]
    async fn tier1_hit_short_circuits_without_capture() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let result = locator
            .find("emulator-5554", &text_selector("Submit"), &FindOptions::default())
            .await
            .expect("find");

        assert_eq!(result.tier, 1);
        assert_eq!(result.source, Source::Accessibility);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].center(), Point { x: 200, y: 150 });
        assert_eq!(bridge.screenshot_count(), 0);
        assert_eq!(ocr.call_count(), 0);
    }

    #[tokio::test]
    async fn tier2_matches_resource_id_patterns() {
        let bridge = Arc::new(MockBridge::new(OVERFLOW_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let result = locator
            .find("emulator-5554", &text_selector("overflow menu"), &FindOptions::default())
            .await
            .expect("find");

        assert_eq!(result.tier, 2);
        assert_eq!(result.source, Source::Accessibility);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.elements.len(), 1);
        assert_eq!(bridge.screenshot_count(), 0);
    }

    #[tokio::test]
    async fn tier3_resolves_by_ocr_and_cleans_up() {
        let bridge = Arc::new(MockBridge::new(EMPTY_XML));
        let ocr = Arc::new(MockOcr::with_words(vec![continue_word()]));
        let locator = build(bridge.clone(), ocr.clone());

        let result = locator
            .find("emulator-5554", &text_selector("Continue"), &FindOptions::default())
            .await
            .expect("find");

        assert_eq!(result.tier, 3);
        assert_eq!(result.source, Source::Ocr);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.elements.len(), 1);
        // OCR center mapped from the 576x1024 image back to device space
        assert_eq!(result.elements[0].center(), Point { x: 263, y: 413 });
        assert_eq!(ocr.call_count(), 1);

        let path = bridge.last_screenshot().expect("captured");
        assert!(!path.exists(), "screenshot must be deleted after the call");
        assert!(!path.with_extension("scaled.png").exists());
    }

    #[tokio::test]
    async fn tier3_retains_capture_when_fallback_requested() {
        let bridge = Arc::new(MockBridge::new(EMPTY_XML));
        let ocr = Arc::new(MockOcr::with_words(vec![continue_word()]));
        let locator = build(bridge.clone(), ocr.clone());

        let options = FindOptions { include_visual_fallback: true, ..FindOptions::default() };
        let result = locator
            .find("emulator-5554", &text_selector("Continue"), &options)
            .await
            .expect("find");

        assert_eq!(result.tier, 3);
        let path = bridge.last_screenshot().expect("captured");
        assert!(path.exists(), "retained screenshot must survive the call");
        remove_capture_files(&path);
    }

    #[tokio::test]
    async fn tier4_surfaces_capped_candidates_without_choosing() {
        let bridge = Arc::new(MockBridge::new(&icons_xml(10)));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let result = locator
            .find("emulator-5554", &text_selector("mystery glyph"), &FindOptions::default())
            .await
            .expect("find");

        assert_eq!(result.tier, 4);
        assert_eq!(result.source, Source::Visual);
        assert_eq!(result.confidence, Confidence::Medium);
        assert!(result.elements.is_empty());
        let crops = result.candidates.expect("candidates");
        assert_eq!(crops.len(), candidates::MAX_CANDIDATES);
        // Reading order: the topmost icon first
        assert_eq!(crops[0].center.y, 124);
        assert!(!crops[0].image.is_empty());

        let path = bridge.last_screenshot().expect("captured");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn tier5_renders_grid_as_last_resort() {
        let bridge = Arc::new(MockBridge::new(EMPTY_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let result = locator
            .find("emulator-5554", &text_selector("nothing here"), &FindOptions::default())
            .await
            .expect("find");

        assert_eq!(result.tier, 5);
        assert_eq!(result.source, Source::Grid);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.elements.is_empty());
        assert!(result.grid_image.is_some());
        assert_eq!(result.grid_positions.as_deref().map(|p| p.len()), Some(5));

        let path = bridge.last_screenshot().expect("captured");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn ocr_failure_degrades_instead_of_erroring() {
        let bridge = Arc::new(MockBridge::new(EMPTY_XML));
        let ocr = Arc::new(MockOcr::failing());
        let locator = build(bridge.clone(), ocr.clone());

        let result = locator
            .find("emulator-5554", &text_selector("anything"), &FindOptions::default())
            .await
            .expect("find must absorb OCR failure");

        assert_eq!(result.tier, 5);
        assert_eq!(ocr.call_count(), 1);
    }

    #[tokio::test]
    async fn grid_refinement_bypasses_the_chain() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let options = FindOptions {
            grid_cell: Some(5),
            grid_position: Some(3),
            ..FindOptions::default()
        };
        let result = locator
            .find("emulator-5554", &Selector::default(), &options)
            .await
            .expect("find");

        assert_eq!(result.tier, 5);
        assert_eq!(result.source, Source::Grid);
        assert_eq!(result.elements.len(), 1);
        // Cell 5 on the raw 1080x1920 screen: second row, first column
        assert_eq!(result.elements[0].center(), Point { x: 135, y: 480 });
        assert_eq!(bridge.tree_count(), 0);
        assert_eq!(bridge.screenshot_count(), 0);
    }

    #[tokio::test]
    async fn grid_refinement_uses_prior_image_dimensions() {
        let bridge = Arc::new(MockBridge::new(EMPTY_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        // A tier-5 run leaves a 576x1024 scale state behind
        let first = locator
            .find("emulator-5554", &text_selector("nothing"), &FindOptions::default())
            .await
            .expect("find");
        assert_eq!(first.tier, 5);

        let options = FindOptions {
            grid_cell: Some(1),
            grid_position: Some(3),
            ..FindOptions::default()
        };
        let result = locator
            .find("emulator-5554", &Selector::default(), &options)
            .await
            .expect("refinement");

        // Cell 1 center of the 576x1024 image is (72,85); device space
        // multiplies by the 1.875 factor.
        assert_eq!(result.elements[0].center(), Point { x: 135, y: 159 });
        assert_eq!(bridge.metadata_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_rejects_before_device_io() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let empty = locator
            .find("emulator-5554", &Selector::default(), &FindOptions::default())
            .await;
        assert!(matches!(empty, Err(TapScoutError::Validation(_))));

        let lone_cell = FindOptions { grid_cell: Some(3), ..FindOptions::default() };
        let result = locator.find("emulator-5554", &Selector::default(), &lone_cell).await;
        assert!(matches!(result, Err(TapScoutError::Validation(_))));

        let bad_cell = FindOptions {
            grid_cell: Some(30),
            grid_position: Some(3),
            ..FindOptions::default()
        };
        let result = locator.find("emulator-5554", &Selector::default(), &bad_cell).await;
        assert!(matches!(result, Err(TapScoutError::Validation(_))));

        assert_eq!(bridge.tree_count(), 0);
        assert_eq!(bridge.screenshot_count(), 0);
    }

    #[tokio::test]
    async fn collaborator_failure_propagates_distinctly() {
        let bridge = Arc::new(MockBridge::failing_dump());
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge, ocr);

        let result = locator
            .find("emulator-5554", &text_selector("Submit"), &FindOptions::default())
            .await;
        assert!(matches!(result, Err(TapScoutError::Device(_))));
    }

    #[tokio::test]
    async fn id_only_selector_skips_text_tiers() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let selector = Selector { resource_id: Some("does_not_exist".into()), ..Selector::default() };
        let result = locator
            .find("emulator-5554", &selector, &FindOptions::default())
            .await
            .expect("find");

        assert!(result.elements.is_empty());
        assert_eq!(result.tier, 1);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(ocr.call_count(), 0);
        assert_eq!(bridge.screenshot_count(), 0);
        assert!(result.visual_fallback.is_none());
    }

    #[tokio::test]
    async fn id_only_selector_can_opt_into_visual_snapshot() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let selector = Selector { resource_id: Some("does_not_exist".into()), ..Selector::default() };
        let options = FindOptions {
            include_visual_fallback: true,
            include_base64: true,
            ..FindOptions::default()
        };
        let result = locator
            .find("emulator-5554", &selector, &options)
            .await
            .expect("find");

        assert_eq!(result.tier, 4);
        assert_eq!(result.source, Source::Visual);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.elements.is_empty());
        assert!(result.grid_image.is_none(), "never a grid on this path");

        let fallback = result.visual_fallback.expect("snapshot");
        assert_eq!(fallback.foreground_app, "com.demo/com.demo.Main");
        assert_eq!(fallback.screen.width, 1080);
        assert!(fallback.screenshot.is_some());

        let path = bridge.last_screenshot().expect("captured");
        assert!(path.exists(), "snapshot file is retained");
        remove_capture_files(&path);
    }

    #[tokio::test]
    async fn anchor_promotes_shared_container_candidate() {
        let bridge = Arc::new(MockBridge::new(ROWS_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let selector = Selector {
            text: Some("Copy".into()),
            nearest_to: Some("Item B".into()),
            ..Selector::default()
        };
        let result = locator
            .find("emulator-5554", &selector, &FindOptions::default())
            .await
            .expect("find");

        assert_eq!(result.tier, 1);
        assert_eq!(result.elements.len(), 2);
        // The Copy button in Item B's row wins over the one above it
        assert_eq!(result.elements[0].center(), Point { x: 970, y: 300 });
        let info = result.sorted_by_proximity_to.expect("proximity info");
        assert_eq!(info.method, ProximityMethod::Containment);
        assert_eq!(info.anchor, "Item B");
        assert!(result.warning.is_none());
    }

    #[tokio::test]
    async fn unresolvable_anchor_warns_and_keeps_order() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge.clone(), ocr.clone());

        let selector = Selector {
            text: Some("Submit".into()),
            nearest_to: Some("Quxx".into()),
            ..Selector::default()
        };
        let result = locator
            .find("emulator-5554", &selector, &FindOptions::default())
            .await
            .expect("find");

        assert_eq!(result.tier, 1);
        assert_eq!(result.elements.len(), 1);
        assert!(result.warning.expect("warning").contains("Quxx"));
        assert!(result.sorted_by_proximity_to.is_none());

        // Anchor resolution ran its own OCR pass and cleaned up after it
        assert_eq!(ocr.call_count(), 1);
        let path = bridge.last_screenshot().expect("captured");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn last_result_is_indexable_but_advisory() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge, ocr);

        locator
            .find("emulator-5554", &text_selector("Submit"), &FindOptions::default())
            .await
            .expect("find");

        assert!(locator.element_at(0).await.is_some());
        assert!(locator.element_at(99).await.is_none());
    }

    #[tokio::test]
    async fn debug_option_attaches_tier_trace() {
        let bridge = Arc::new(MockBridge::new(SUBMIT_XML));
        let ocr = Arc::new(MockOcr::empty());
        let locator = build(bridge, ocr);

        let options = FindOptions { debug: true, ..FindOptions::default() };
        let result = locator
            .find("emulator-5554", &text_selector("Submit"), &options)
            .await
            .expect("find");

        let debug = result.debug.expect("trace");
        assert!(debug.steps.iter().any(|s| s.contains("tier 1")));
    }
}
