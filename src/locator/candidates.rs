/// Visual candidate filter: selects clickable, unlabeled, icon-sized
/// elements as tap candidates and crops their image regions so a human or
/// vision-capable agent can disambiguate.
use base64::Engine as _;
use image::DynamicImage;

use crate::errors::{TapScoutError, TapScoutResult};
use crate::locator::scaling;
use crate::locator::types::{AccessibilityNode, VisualCandidate};

/// Cap on surfaced candidates per request.
pub const MAX_CANDIDATES: usize = 6;

const MIN_ICON_EDGE: i32 = 16;
const MAX_ICON_EDGE: i32 = 200;
const MIN_ASPECT: f32 = 0.5;
const MAX_ASPECT: f32 = 2.0;

/// Icon-sized: both edges within [16, 200] px and aspect ratio within
/// [0.5, 2.0].
pub fn is_icon_sized(width: i32, height: i32) -> bool {
    if width < MIN_ICON_EDGE || width > MAX_ICON_EDGE {
        return false;
    }
    if height < MIN_ICON_EDGE || height > MAX_ICON_EDGE {
        return false;
    }
    let aspect = width as f32 / height as f32;
    (MIN_ASPECT..=MAX_ASPECT).contains(&aspect)
}

/// Select up to `MAX_CANDIDATES` clickable elements with neither text nor
/// content description whose box passes the icon-size predicate. Sorted in
/// reading order (top-to-bottom, then left-to-right) before truncation so
/// the cap keeps the visually first candidates.
pub fn filter_icon_candidates<'a>(nodes: &[&'a AccessibilityNode]) -> Vec<&'a AccessibilityNode> {
    let mut out: Vec<&AccessibilityNode> = nodes
        .iter()
        .copied()
        .filter(|n| {
            n.clickable
                && n.text.is_empty()
                && n.content_desc.is_empty()
                && is_icon_sized(n.bounds.width(), n.bounds.height())
        })
        .collect();
    out.sort_by_key(|n| (n.center_y, n.center_x));
    out.truncate(MAX_CANDIDATES);
    out
}

/// Crop each candidate's region from the (scaled) screenshot and encode it
/// as base64 JPEG. Bounds are converted to image space with `factor` and
/// clamped to the image before cropping.
pub fn crop_candidates(
    image: &DynamicImage,
    nodes: &[&AccessibilityNode],
    factor: f64,
) -> TapScoutResult<Vec<VisualCandidate>> {
    let (img_w, img_h) = (image.width() as i32, image.height() as i32);
    let mut out = Vec::with_capacity(nodes.len());

    for (index, node) in nodes.iter().enumerate() {
        let scaled = scaling::bounds_to_image_space(&node.bounds, factor);
        let x0 = scaled.left.clamp(0, img_w);
        let y0 = scaled.top.clamp(0, img_h);
        let x1 = scaled.right.clamp(0, img_w);
        let y1 = scaled.bottom.clamp(0, img_h);
        let (w, h) = (x1 - x0, y1 - y0);
        if w <= 0 || h <= 0 {
            tracing::debug!(index, bounds = %node.bounds.label(), "candidate crop off-image, skipped");
            continue;
        }

        let crop = image.crop_imm(x0 as u32, y0 as u32, w as u32, h as u32);
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(crop.to_rgb8())
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .map_err(|e| TapScoutError::Image(format!("candidate JPEG encode: {e}")))?;

        out.push(VisualCandidate {
            index,
            bounds: node.bounds,
            center: node.center(),
            image: base64::engine::general_purpose::STANDARD.encode(&jpeg),
        });
    }

    Ok(out)
}
