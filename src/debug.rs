use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut,
        draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
    },
    rect::Rect,
};
use log::{debug, warn};
use rusttype::{Font, Scale};

use crate::{
    image_utils::{BLUE, DARK_BLUE, DARK_GREEN, DARK_RED, GREEN, PINK, RED, WHITE_RGB},
    interpret::SectionDetections,
    lines::LineDetection,
    report::{SectionReport, SheetReport},
    template::SheetTemplate,
    types::Axis,
};

/// Creates a path for a debug image.
pub fn debug_image_path(base: &Path, label: &str) -> PathBuf {
    let mut result = PathBuf::from(base);
    result.set_file_name(format!(
        "{}_debug_{}.png",
        base.file_stem().unwrap_or_default().to_string_lossy(),
        label
    ));
    result
}

/// Writes annotated copies of an input image, or of crops taken from it,
/// next to the input file. Failures to write are logged, not returned.
pub struct ImageDebugWriter {
    input_path: PathBuf,
    input_image: RgbImage,
}

impl ImageDebugWriter {
    pub fn new(input_path: PathBuf, input_image: RgbImage) -> Self {
        Self {
            input_path,
            input_image,
        }
    }

    /// Draws on a copy of the whole input and saves it under `label`.
    pub fn write(&self, label: &str, draw: impl FnOnce(&mut RgbImage)) -> Option<PathBuf> {
        self.save(label, self.input_image.clone(), draw)
    }

    /// Draws on a copy of a section crop and saves it under `label`.
    pub fn write_section(
        &self,
        label: &str,
        section: &RgbImage,
        draw: impl FnOnce(&mut RgbImage),
    ) -> Option<PathBuf> {
        self.save(label, section.clone(), draw)
    }

    fn save(
        &self,
        label: &str,
        mut canvas: RgbImage,
        draw: impl FnOnce(&mut RgbImage),
    ) -> Option<PathBuf> {
        draw(&mut canvas);
        let path = debug_image_path(&self.input_path, label);
        match canvas.save(&path) {
            Ok(()) => {
                debug!("wrote debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("unable to write debug image {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Loads a TrueType font for labeling debug images.
pub fn load_font(path: &Path) -> Option<Font<'static>> {
    let bytes = std::fs::read(path).ok()?;
    Font::try_from_vec(bytes)
}

fn draw_grid_lines_mut(canvas: &mut RgbImage, detection: &LineDetection, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    for &position in detection.coordinates.as_slice() {
        let p = position as f32;
        match detection.axis {
            Axis::Horizontal => {
                draw_line_segment_mut(canvas, (0.0, p), (width as f32 - 1.0, p), color)
            }
            Axis::Vertical => {
                draw_line_segment_mut(canvas, (p, 0.0), (p, height as f32 - 1.0), color)
            }
        }
    }
}

/// Draws a debug image of one section: merged grid lines across the whole
/// crop, the raw segments they came from, every detected circle (assigned in
/// green, unassigned in pink) and, given a font, the score of each marked
/// cell.
pub fn draw_section_debug_image_mut(
    canvas: &mut RgbImage,
    detections: &SectionDetections,
    report: &SectionReport,
    font: Option<&Font>,
) {
    draw_grid_lines_mut(canvas, &detections.rows, BLUE);
    draw_grid_lines_mut(canvas, &detections.columns, RED);

    for segment in detections
        .rows
        .segments
        .iter()
        .chain(&detections.columns.segments)
    {
        draw_line_segment_mut(
            canvas,
            (segment.start.x as f32, segment.start.y as f32),
            (segment.end.x as f32, segment.end.y as f32),
            GREEN,
        );
    }

    for bubble in &detections.bubbles {
        let color = if report.unassigned_bubbles.contains(bubble) {
            PINK
        } else {
            DARK_GREEN
        };
        let center = (bubble.x as i32, bubble.y as i32);
        draw_hollow_circle_mut(canvas, center, bubble.radius as i32, color);
        draw_filled_circle_mut(canvas, center, 1, DARK_RED);
    }

    let Some(font) = font else {
        return;
    };
    let scale = Scale::uniform(12.0);
    for (cell, bubble) in &report.unique_cells {
        let Some(score) = report.row_scores.get(&cell.row) else {
            continue;
        };
        draw_text_with_background_mut(
            canvas,
            &score.to_string(),
            (bubble.x + bubble.radius) as i32 + 2,
            bubble.y as i32 - (bubble.radius as i32),
            scale,
            font,
            DARK_BLUE,
            WHITE_RGB,
        );
    }
}

/// Draws a debug image outlining every section crop on the full canvas,
/// labeled with its section total when a font is given.
pub fn draw_sections_overview_mut(
    canvas: &mut RgbImage,
    template: &SheetTemplate,
    report: &SheetReport,
    font: Option<&Font>,
) {
    let scale = Scale::uniform(16.0);
    for section in &template.sections {
        draw_hollow_rect_mut(canvas, section.bounds.to_rect(), PINK);

        let (Some(font), Some(section_report)) = (font, report.sections.get(&section.id)) else {
            continue;
        };
        let label = format!("{}: {}", section.title, section_report.total_score);
        let (_, label_height) = text_size(scale, font, &label);
        draw_text_with_background_mut(
            canvas,
            &label,
            section.bounds.left as i32,
            section.bounds.top as i32 - label_height - 2,
            scale,
            font,
            DARK_GREEN,
            WHITE_RGB,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_text_with_background_mut(
    canvas: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    scale: Scale,
    font: &Font,
    text_color: Rgb<u8>,
    background_color: Rgb<u8>,
) {
    let (text_width, text_height) = text_size(scale, font, text);
    if text_width <= 0 || text_height <= 0 {
        return;
    }

    draw_filled_rect_mut(
        canvas,
        Rect::at(x, y).of_size(text_width as u32, text_height as u32),
        background_color,
    );
    draw_text_mut(canvas, text_color, x, y, scale, font, text);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_path_sits_next_to_input() {
        assert_eq!(
            debug_image_path(Path::new("/scans/sheet-01.jpeg"), "section2"),
            PathBuf::from("/scans/sheet-01_debug_section2.png")
        );
    }

    #[test]
    fn writes_section_copy() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.png");
        let writer = ImageDebugWriter::new(input, RgbImage::from_pixel(50, 40, WHITE_RGB));
        let section = RgbImage::from_pixel(20, 15, WHITE_RGB);

        let path = writer
            .write_section("box", &section, |canvas| {
                canvas.put_pixel(0, 0, RED);
            })
            .unwrap();
        assert_eq!(path, dir.path().join("scan_debug_box.png"));

        let written = image::open(&path).unwrap().into_rgb8();
        assert_eq!(written.dimensions(), (20, 15));
        assert_eq!(*written.get_pixel(0, 0), RED);
        assert_eq!(*written.get_pixel(1, 0), WHITE_RGB);
    }

    #[test]
    fn missing_font_is_none() {
        assert!(load_font(Path::new("/nonexistent/font.ttf")).is_none());
    }
}
