use serde::{Deserialize, Serialize};

/// A point in device pixel coordinates (or image coordinates where noted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Rectangle in pixel coordinates, matching the accessibility dump
/// convention `[left,top][right,bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2,
            y: (self.top + self.bottom) / 2,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Display form used in result payloads: `"[x0,y0][x1,y1]"`.
    pub fn label(&self) -> String {
        format!("[{},{}][{},{}]", self.left, self.top, self.right, self.bottom)
    }
}

/// One element of the device accessibility tree.
///
/// `center_x`/`center_y` are derived from `bounds`; `set_bounds` is the only
/// mutation path, so the midpoint invariant cannot drift.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessibilityNode {
    pub index: u32,
    pub text: String,
    pub resource_id: String,
    pub class_name: String,
    pub content_desc: String,
    pub bounds: Bounds,
    pub center_x: i32,
    pub center_y: i32,
    pub clickable: bool,
    pub focusable: bool,
    pub children: Vec<AccessibilityNode>,
}

impl AccessibilityNode {
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
        let c = bounds.center();
        self.center_x = c.x;
        self.center_y = c.y;
    }

    pub fn center(&self) -> Point {
        Point { x: self.center_x, y: self.center_y }
    }
}

/// A word recognized by the OCR engine, in image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    /// Normalized from the engine's 0-100 scale.
    pub confidence: f32,
    pub bounds: Bounds,
}

/// A text-search hit over OCR results.
///
/// `bounds` stays in image space; `center` is the actionable tap point in
/// device space once the resolution engine has applied the active scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrElement {
    pub index: usize,
    pub text: String,
    pub confidence: f32,
    pub bounds: Bounds,
    pub bounds_label: String,
    pub center: Point,
}

/// An unlabeled clickable region considered icon-like, with a cropped
/// image for the caller to disambiguate visually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualCandidate {
    pub index: usize,
    pub bounds: Bounds,
    pub center: Point,
    /// Base64-encoded JPEG crop of the candidate region.
    pub image: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScreenMetadata {
    pub width: u32,
    pub height: u32,
    pub density: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Accessibility,
    Ocr,
    Visual,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityMethod {
    Containment,
    Distance,
}

/// Caller-supplied element query. Fields AND together when several are set;
/// `nearest_to` does not select on its own, it re-ranks the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selector {
    pub resource_id: Option<String>,
    pub text: Option<String>,
    pub text_contains: Option<String>,
    pub class_name: Option<String>,
    pub nearest_to: Option<String>,
}

impl Selector {
    /// The free-text query, if any. Tiers 2-4 require one.
    pub fn free_text(&self) -> Option<&str> {
        self.text.as_deref().or(self.text_contains.as_deref())
    }

    pub fn has_criteria(&self) -> bool {
        self.resource_id.is_some()
            || self.text.is_some()
            || self.text_contains.is_some()
            || self.class_name.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub include_visual_fallback: bool,
    #[serde(default)]
    pub include_base64: bool,
    #[serde(default)]
    pub grid_cell: Option<u32>,
    #[serde(default)]
    pub grid_position: Option<u32>,
}

/// Flattened view of a matched accessibility node (children omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSummary {
    pub text: String,
    pub resource_id: String,
    pub class_name: String,
    pub content_desc: String,
    pub bounds: Bounds,
    pub center: Point,
    pub clickable: bool,
}

impl From<&AccessibilityNode> for ElementSummary {
    fn from(node: &AccessibilityNode) -> Self {
        Self {
            text: node.text.clone(),
            resource_id: node.resource_id.clone(),
            class_name: node.class_name.clone(),
            content_desc: node.content_desc.clone(),
            bounds: node.bounds,
            center: node.center(),
            clickable: node.clickable,
        }
    }
}

/// One entry of a tier result. Consumers must match on `kind` before
/// touching variant-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FoundElement {
    Accessibility(ElementSummary),
    Ocr(OcrElement),
    GridPoint { cell: u32, position: u32, x: i32, y: i32 },
}

impl FoundElement {
    pub fn center(&self) -> Point {
        match self {
            FoundElement::Accessibility(s) => s.center,
            FoundElement::Ocr(el) => el.center,
            FoundElement::GridPoint { x, y, .. } => Point { x: *x, y: *y },
        }
    }
}

/// Generic fallback snapshot for selectors that cannot degrade to OCR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualFallback {
    /// Base64 PNG of the (scaled) screen, present when the caller asked for
    /// inline image data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// Retained screenshot file on the local filesystem.
    pub screenshot_path: String,
    pub screen: ScreenMetadata,
    pub foreground_app: String,
}

/// Record of an anchor-based re-ranking pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityInfo {
    pub anchor: String,
    pub anchor_center: Point,
    pub method: ProximityMethod,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugTrace {
    pub steps: Vec<String>,
}

/// The unified output of a resolution request. At most one of the optional
/// payloads is populated; `elements` is empty when the result is a
/// manual-selection artifact (grid image, candidate crops, visual snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindResult {
    pub elements: Vec<FoundElement>,
    pub source: Source,
    pub tier: u8,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<VisualCandidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_positions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_fallback: Option<VisualFallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorted_by_proximity_to: Option<ProximityInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugTrace>,
}

impl FindResult {
    /// A bare result with no payloads; the engine fills in extras.
    pub fn new(source: Source, tier: u8, confidence: Confidence) -> Self {
        Self {
            elements: Vec::new(),
            source,
            tier,
            confidence,
            candidates: None,
            grid_image: None,
            grid_positions: None,
            visual_fallback: None,
            sorted_by_proximity_to: None,
            warning: None,
            debug: None,
        }
    }
}
