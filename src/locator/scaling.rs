/// Conversions between device pixel space and scaled image space.
///
/// Screenshots larger than a configured maximum dimension are downscaled
/// before OCR and artifact rendering; these helpers move tap coordinates
/// across that boundary. All rounding is to the nearest integer pixel, and
/// a round trip stays within one pixel of the original point.
use crate::locator::types::{Bounds, Point};

/// Ratio between device pixels and image pixels. Returns 1.0 when the
/// longer device side already fits within `max_dim`.
pub fn scale_factor(device_w: u32, device_h: u32, max_dim: u32) -> f64 {
    let longer = device_w.max(device_h);
    if max_dim == 0 || longer <= max_dim {
        1.0
    } else {
        longer as f64 / max_dim as f64
    }
}

pub fn to_image_space(x: i32, y: i32, factor: f64) -> Point {
    Point {
        x: (x as f64 / factor).round() as i32,
        y: (y as f64 / factor).round() as i32,
    }
}

pub fn to_device_space(x: i32, y: i32, factor: f64) -> Point {
    Point {
        x: (x as f64 * factor).round() as i32,
        y: (y as f64 * factor).round() as i32,
    }
}

pub fn bounds_to_image_space(bounds: &Bounds, factor: f64) -> Bounds {
    let tl = to_image_space(bounds.left, bounds.top, factor);
    let br = to_image_space(bounds.right, bounds.bottom, factor);
    Bounds::new(tl.x, tl.y, br.x, br.y)
}
