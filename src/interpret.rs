use std::fmt::Display;
use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use log::info;
use logging_timer::time;
use rusttype::Font;

use crate::bubbles::detect_bubbles;
use crate::config::DetectorConfig;
use crate::debug::{draw_section_debug_image_mut, draw_sections_overview_mut, ImageDebugWriter};
use crate::grid::assign_bubbles;
use crate::image_utils::size_image_to_fit;
use crate::lines::{detect_lines, LineDetection};
use crate::report::{SectionReport, SheetReport};
use crate::scoring::score_cells;
use crate::template::SheetTemplate;
use crate::types::{Axis, Bubble, PixelBounds, SectionId, Size};

#[derive(Clone)]
pub struct InterpretOptions {
    pub debug: bool,
    pub template: SheetTemplate,
    pub config: DetectorConfig,
    /// Used to label debug images; without it they carry no text.
    pub font: Option<Font<'static>>,
}

#[derive(Debug)]
pub enum InterpretError {
    ImageOpenError(PathBuf),
    EmptyImage,
    SectionOutOfBounds {
        section_id: SectionId,
        bounds: PixelBounds,
        canvas: Size<u32>,
    },
    InvalidConfig(String),
    TemplateError(PathBuf, String),
    ConfigError(PathBuf, String),
}

impl Display for InterpretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpretError::ImageOpenError(path) => {
                write!(f, "unable to open image {}", path.display())
            }
            InterpretError::EmptyImage => write!(f, "image has no pixels"),
            InterpretError::SectionOutOfBounds {
                section_id,
                bounds,
                canvas,
            } => write!(
                f,
                "section {} at {} does not fit the {}x{} canvas",
                section_id, bounds, canvas.width, canvas.height
            ),
            InterpretError::InvalidConfig(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            InterpretError::TemplateError(path, message) => {
                write!(f, "unable to load template {}: {}", path.display(), message)
            }
            InterpretError::ConfigError(path, message) => {
                write!(f, "unable to load config {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for InterpretError {}

pub type InterpretResult<T> = Result<T, InterpretError>;

/// What the detectors saw in one section, kept for debug rendering.
#[derive(Debug, Clone)]
pub struct SectionDetections {
    pub section_id: SectionId,
    /// The section crop all positions below are relative to.
    pub image: RgbImage,
    pub rows: LineDetection,
    pub columns: LineDetection,
    pub bubbles: Vec<Bubble>,
}

#[derive(Debug, Clone)]
pub struct InterpretedSheet {
    /// The input resized to the template canvas.
    pub canvas: RgbImage,
    pub report: SheetReport,
    pub detections: Vec<SectionDetections>,
}

#[time]
pub fn load_sheet_image(image_path: &Path) -> InterpretResult<RgbImage> {
    match image::open(image_path) {
        Ok(img) => Ok(img.into_rgb8()),
        Err(_) => Err(InterpretError::ImageOpenError(image_path.to_path_buf())),
    }
}

/// Resizes a scan to the template canvas.
pub fn prepare_canvas(image: &RgbImage, canvas_size: Size<u32>) -> InterpretResult<RgbImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || canvas_size.width == 0 || canvas_size.height == 0 {
        return Err(InterpretError::EmptyImage);
    }
    if (width, height) == (canvas_size.width, canvas_size.height) {
        return Ok(image.clone());
    }
    Ok(size_image_to_fit(image, canvas_size.width, canvas_size.height))
}

/// Runs the three detectors over a section crop. They share nothing, so
/// they run in parallel.
#[time]
pub fn detect_section(
    section: &RgbImage,
    config: &DetectorConfig,
) -> (LineDetection, LineDetection, Vec<Bubble>) {
    let ((rows, columns), bubbles) = rayon::join(
        || {
            rayon::join(
                || detect_lines(section, Axis::Horizontal, config.lines(Axis::Horizontal)),
                || detect_lines(section, Axis::Vertical, config.lines(Axis::Vertical)),
            )
        },
        || detect_bubbles(section, &config.bubbles),
    );
    (rows, columns, bubbles)
}

/// Assigns and scores the detections of one section.
pub fn score_section(
    section_id: &SectionId,
    rows: &LineDetection,
    columns: &LineDetection,
    bubbles: &[Bubble],
    config: &DetectorConfig,
) -> SectionReport {
    let row_ranges = rows.ranges();
    let column_ranges = columns.ranges();
    let total_rows = row_ranges.len() as u32;
    let total_columns = column_ranges.len() as u32;

    let assignment = assign_bubbles(
        &row_ranges,
        &column_ranges,
        bubbles,
        config.cell_conflict_policy,
    );
    let scores = score_cells(&assignment.cells, total_columns, config.row_mark_policy);

    info!(
        "{}: {} rows, {} columns, {} bubbles ({} unassigned), total score {}",
        section_id,
        total_rows,
        total_columns,
        bubbles.len(),
        assignment.unassigned.len(),
        scores.total_score
    );

    SectionReport::new(
        section_id.clone(),
        total_rows,
        total_columns,
        assignment,
        scores,
    )
}

/// Detects, assigns and scores a single section crop.
#[time]
pub fn interpret_section(
    section_id: &SectionId,
    section: &RgbImage,
    config: &DetectorConfig,
) -> (SectionReport, LineDetection, LineDetection, Vec<Bubble>) {
    let (rows, columns, bubbles) = detect_section(section, config);
    let report = score_section(section_id, &rows, &columns, &bubbles, config);
    (report, rows, columns, bubbles)
}

/// Scores every section of a sheet image.
pub fn interpret_sheet(
    image: &RgbImage,
    template: &SheetTemplate,
    config: &DetectorConfig,
) -> InterpretResult<SheetReport> {
    interpret_sheet_with_detections(image, template, config).map(|sheet| sheet.report)
}

/// Scores every section of a sheet image, keeping what was detected.
#[time]
pub fn interpret_sheet_with_detections(
    image: &RgbImage,
    template: &SheetTemplate,
    config: &DetectorConfig,
) -> InterpretResult<InterpretedSheet> {
    config.validate()?;
    let canvas = prepare_canvas(image, template.canvas_size)?;

    for section in &template.sections {
        if !section.bounds.fits_within(template.canvas_size) {
            return Err(InterpretError::SectionOutOfBounds {
                section_id: section.id.clone(),
                bounds: section.bounds,
                canvas: template.canvas_size,
            });
        }
    }

    let mut report = SheetReport::default();
    let mut detections = Vec::with_capacity(template.sections.len());
    for section in &template.sections {
        let bounds = section.bounds;
        let crop =
            imageops::crop_imm(&canvas, bounds.left, bounds.top, bounds.width, bounds.height)
                .to_image();
        let (section_report, rows, columns, bubbles) =
            interpret_section(&section.id, &crop, config);

        report.sections.insert(section.id.clone(), section_report);
        detections.push(SectionDetections {
            section_id: section.id.clone(),
            image: crop,
            rows,
            columns,
            bubbles,
        });
    }

    info!("sheet total score {}", report.total_score());

    Ok(InterpretedSheet {
        canvas,
        report,
        detections,
    })
}

/// Loads a scan from disk and scores it, writing debug images next to it
/// when asked to.
#[time]
pub fn interpret_sheet_file(
    image_path: &Path,
    options: &InterpretOptions,
) -> InterpretResult<SheetReport> {
    let image = load_sheet_image(image_path)?;
    if !options.debug {
        return interpret_sheet(&image, &options.template, &options.config);
    }

    let sheet = interpret_sheet_with_detections(&image, &options.template, &options.config)?;
    let debug = ImageDebugWriter::new(image_path.to_path_buf(), sheet.canvas.clone());
    let font = options.font.as_ref();

    debug.write("sections", |canvas| {
        draw_sections_overview_mut(canvas, &options.template, &sheet.report, font);
    });
    for detections in &sheet.detections {
        if let Some(section_report) = sheet.report.sections.get(&detections.section_id) {
            debug.write_section(detections.section_id.as_str(), &detections.image, |canvas| {
                draw_section_debug_image_mut(canvas, detections, section_report, font);
            });
        }
    }

    Ok(sheet.report)
}
