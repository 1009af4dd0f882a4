/// Grid overlay generator: the terminal fallback tier.
///
/// The screen is partitioned into a fixed 4x6 grid of 24 cells, numbered 1
/// (top-left) to 24 (bottom-right), left-to-right then top-to-bottom. A
/// caller picks a cell from the rendered overlay, then one of five
/// positions within it, and gets back a concrete tap point without any
/// element detection at all.
use image::DynamicImage;

use crate::errors::{TapScoutError, TapScoutResult};
use crate::locator::types::{Bounds, Point};

pub const GRID_COLS: u32 = 4;
pub const GRID_ROWS: u32 = 6;
pub const GRID_CELLS: u32 = GRID_COLS * GRID_ROWS;

/// Stable position labels, indexed by position number 1-5.
pub const POSITION_LABELS: [&str; 5] =
    ["top-left", "top-right", "center", "bottom-left", "bottom-right"];

/// Pixel bounds of a cell. Integer tiling (`x0 = col*w/4`, `x1 =
/// (col+1)*w/4`) partitions the screen exactly, with no gaps or overlaps
/// even when the dimensions do not divide evenly.
pub fn grid_cell_bounds(cell: u32, width: u32, height: u32) -> TapScoutResult<Bounds> {
    if !(1..=GRID_CELLS).contains(&cell) {
        return Err(TapScoutError::Validation(format!(
            "grid cell {cell} is out of range; pick a cell between 1 and {GRID_CELLS} from the grid image"
        )));
    }
    let col = (cell - 1) % GRID_COLS;
    let row = (cell - 1) / GRID_COLS;
    Ok(Bounds::new(
        (col * width / GRID_COLS) as i32,
        (row * height / GRID_ROWS) as i32,
        ((col + 1) * width / GRID_COLS) as i32,
        ((row + 1) * height / GRID_ROWS) as i32,
    ))
}

/// Tap point for a position within a cell: corners sit at 25%/75% offsets
/// from the cell edges, position 3 is the exact center.
pub fn position_coordinates(position: u32, cell: &Bounds) -> TapScoutResult<Point> {
    let (w, h) = (cell.width(), cell.height());
    let (x, y) = match position {
        1 => (cell.left + w / 4, cell.top + h / 4),
        2 => (cell.left + 3 * w / 4, cell.top + h / 4),
        3 => (cell.left + w / 2, cell.top + h / 2),
        4 => (cell.left + w / 4, cell.top + 3 * h / 4),
        5 => (cell.left + 3 * w / 4, cell.top + 3 * h / 4),
        _ => {
            return Err(TapScoutError::Validation(format!(
                "grid position {position} is out of range; pick 1-5 ({})",
                POSITION_LABELS.join(", ")
            )))
        }
    };
    Ok(Point { x, y })
}

// ── Overlay rendering ───────────────────────────────────────────────────────

const LINE_COLOR: [u8; 4] = [235, 64, 52, 150];
const BADGE_TEXT: [u8; 4] = [255, 255, 255, 255];

/// 3x5 digit glyphs; bit 2 is the leftmost pixel of a row.
const DIGITS_3X5: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b001, 0b010, 0b010], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

fn blend(pixel: &mut image::Rgba<u8>, color: [u8; 4]) {
    let a = color[3] as u16;
    for i in 0..3 {
        pixel[i] = ((pixel[i] as u16 * (255 - a) + color[i] as u16 * a) / 255) as u8;
    }
    pixel[3] = 255;
}

fn draw_digit(canvas: &mut image::RgbaImage, digit: u8, px: u32, py: u32, scale: u32) {
    let glyph = &DIGITS_3X5[(digit as usize).min(9)];
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for col in 0..3u32 {
            if (bits >> (2 - col)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + col * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        blend(canvas.get_pixel_mut(x, y), BADGE_TEXT);
                    }
                }
            }
        }
    }
}

/// Darkened badge box with the cell number, centered on (cx, cy).
fn draw_cell_number(canvas: &mut image::RgbaImage, number: u32, cx: u32, cy: u32, scale: u32) {
    let digits: Vec<u8> = number
        .to_string()
        .bytes()
        .map(|b| b.wrapping_sub(b'0'))
        .collect();
    let (w, h) = canvas.dimensions();
    let glyph_w = 3 * scale;
    let gap = scale;
    let text_w = digits.len() as u32 * glyph_w + (digits.len() as u32 - 1) * gap;
    let text_h = 5 * scale;
    let pad = 2 * scale;

    let box_w = text_w + 2 * pad;
    let box_h = text_h + 2 * pad;
    let box_x = cx.saturating_sub(box_w / 2);
    let box_y = cy.saturating_sub(box_h / 2);

    for dy in 0..box_h {
        for dx in 0..box_w {
            let (x, y) = (box_x + dx, box_y + dy);
            if x < w && y < h {
                let p = canvas.get_pixel_mut(x, y);
                for i in 0..3 {
                    p[i] = (p[i] as u16 * 3 / 10) as u8;
                }
                p[3] = 255;
            }
        }
    }

    let mut tx = box_x + pad;
    let ty = box_y + pad;
    for &d in &digits {
        draw_digit(canvas, d, tx, ty, scale);
        tx += glyph_w + gap;
    }
}

/// Render the numbered 4x6 grid onto a screenshot. Returns PNG bytes.
pub fn create_grid_overlay(screenshot: &DynamicImage) -> TapScoutResult<Vec<u8>> {
    let mut canvas = screenshot.to_rgba8();
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return Err(TapScoutError::Image("cannot overlay a zero-size image".into()));
    }

    // Grid lines, 2 px, semi-transparent
    for col in 1..GRID_COLS {
        let x = col * w / GRID_COLS;
        for y in 0..h {
            blend(canvas.get_pixel_mut(x.min(w - 1), y), LINE_COLOR);
            if x + 1 < w {
                blend(canvas.get_pixel_mut(x + 1, y), LINE_COLOR);
            }
        }
    }
    for row in 1..GRID_ROWS {
        let y = row * h / GRID_ROWS;
        for x in 0..w {
            blend(canvas.get_pixel_mut(x, y.min(h - 1)), LINE_COLOR);
            if y + 1 < h {
                blend(canvas.get_pixel_mut(x, y + 1), LINE_COLOR);
            }
        }
    }

    // Cell numbers at each cell center
    let cell_w = w / GRID_COLS;
    let scale = if cell_w >= 160 { 3 } else { 2 };
    for cell in 1..=GRID_CELLS {
        let bounds = grid_cell_bounds(cell, w, h)?;
        let c = bounds.center();
        draw_cell_number(&mut canvas, cell, c.x.max(0) as u32, c.y.max(0) as u32, scale);
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| TapScoutError::Image(format!("grid PNG encode: {e}")))?;
    Ok(out)
}
