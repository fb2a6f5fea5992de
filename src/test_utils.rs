//! Synthetic evaluation-sheet rasters shared by the unit tests.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;

use crate::image_utils::WHITE_RGB;
use crate::types::PixelBounds;

pub const INK: Rgb<u8> = Rgb([20, 20, 20]);

/// Horizontal grid line positions of [`grid_section`] sheets.
pub const ROW_LINES: [u32; 4] = [10, 40, 70, 100];
/// Vertical grid line positions of [`grid_section`] sheets: 5 columns.
pub const COLUMN_LINES: [u32; 6] = [10, 50, 90, 130, 170, 210];

/// Horizontal grid line positions of the 208x148 "Knowledge of Subject"
/// crop: 5 rows.
pub const SHEET_ROW_LINES: [u32; 6] = [10, 34, 58, 82, 106, 130];
/// Vertical grid line positions of the 208x148 crop: 5 columns.
pub const SHEET_COLUMN_LINES: [u32; 6] = [10, 48, 86, 124, 162, 200];

/// A 220x130 white section with a printed grid. Horizontal lines sit at the
/// given ys and span x 10..=211; vertical lines sit at the given xs and span
/// y 10..=101. All lines are 2px thick.
pub fn grid_section(ys: &[u32], xs: &[u32]) -> RgbImage {
    let mut img = RgbImage::from_pixel(220, 130, WHITE_RGB);
    draw_grid_mut(&mut img, 0, 0, ys, xs);
    img
}

/// A 208x148 white section with the printed 5x5 grid of the real sheet.
pub fn sheet_section() -> RgbImage {
    let mut img = RgbImage::from_pixel(208, 148, WHITE_RGB);
    draw_grid_mut(&mut img, 0, 0, &SHEET_ROW_LINES, &SHEET_COLUMN_LINES);
    img
}

/// Draws 2px grid lines. Lines run between the outermost lines of the other
/// axis, or over the standard grid's extent when that axis has none.
pub fn draw_grid_mut(img: &mut RgbImage, left: u32, top: u32, ys: &[u32], xs: &[u32]) {
    let (x_start, x_end) = span(xs, (10, 212));
    let (y_start, y_end) = span(ys, (10, 102));
    for &y in ys {
        draw_filled_rect_mut(
            img,
            Rect::at((left + x_start) as i32, (top + y) as i32).of_size(x_end - x_start, 2),
            INK,
        );
    }
    for &x in xs {
        draw_filled_rect_mut(
            img,
            Rect::at((left + x) as i32, (top + y_start) as i32).of_size(2, y_end - y_start),
            INK,
        );
    }
}

fn span(lines: &[u32], default: (u32, u32)) -> (u32, u32) {
    match (lines.first(), lines.last()) {
        (Some(&first), Some(&last)) if last > first => (first, last + 2),
        _ => default,
    }
}

/// Center of a cell of the standard grid, relative to the section.
pub fn cell_center(row: u32, column: u32) -> (i32, i32) {
    cell_center_of(&ROW_LINES, &COLUMN_LINES, row, column)
}

/// Center of the cell at 1-based `row` and `column` of a grid with the
/// given line positions.
pub fn cell_center_of(ys: &[u32], xs: &[u32], row: u32, column: u32) -> (i32, i32) {
    let x = (xs[column as usize - 1] + xs[column as usize]) / 2;
    let y = (ys[row as usize - 1] + ys[row as usize]) / 2;
    (x as i32, y as i32)
}

/// Fills a bubble of the given radius in a cell of the standard grid drawn
/// at `bounds`.
pub fn mark_cell_mut(img: &mut RgbImage, bounds: PixelBounds, row: u32, column: u32, radius: i32) {
    let (x, y) = cell_center(row, column);
    draw_filled_circle_mut(
        img,
        (bounds.left as i32 + x, bounds.top as i32 + y),
        radius,
        INK,
    );
}

pub fn assert_close(actual: &[u32], expected: &[u32]) {
    assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!(a.abs_diff(*e) <= 2, "{:?} vs {:?}", actual, expected);
    }
}
