//! Grid line detection.
//!
//! A section crop is reduced to a binary mask holding only long straight runs
//! along one axis; Hough voting proposes candidate lines over that mask, and
//! each candidate is walked pixel by pixel to cut it into the segments
//! actually present. Every near-axis segment contributes one observation of
//! the line's position, and close observations are merged into a single
//! grid line.

use image::{GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{self, LineDetectionOptions, PolarLine};
use imageproc::point::Point;
use log::debug;
use logging_timer::time;

use crate::config::{LineDetectionConfig, SegmentConfig};
use crate::geometry::Segment;
use crate::image_utils::{
    binarize_inverted, close_rect, count_pixels, dilate_rect, grayscale, open_rect, WHITE,
};
use crate::types::{Axis, BoundaryRange, LineCoordinates};

/// Result of line detection along one axis of a section.
#[derive(Debug, Clone, PartialEq)]
pub struct LineDetection {
    pub axis: Axis,
    /// Accepted segments, in mask scan order.
    pub segments: Vec<Segment>,
    pub coordinates: LineCoordinates,
}

impl LineDetection {
    pub fn ranges(&self) -> Vec<BoundaryRange> {
        self.coordinates.ranges()
    }
}

/// Finds the grid lines running along `axis` in a section image.
///
/// Finding nothing is not an error: the result is simply empty.
#[time]
pub fn detect_lines(section: &RgbImage, axis: Axis, config: &LineDetectionConfig) -> LineDetection {
    let mask = line_mask(section, axis, config);
    debug!(
        "{} line mask has {} foreground pixels",
        axis,
        count_pixels(&mask, &WHITE)
    );

    let segments = find_segments(&mask, axis, config);
    let raw = segments.iter().map(|s| s.axis_position(axis)).collect();
    let coordinates = LineCoordinates::merge(raw, config.merge_distance);

    if coordinates.is_empty() {
        debug!("no {} lines found", axis);
    } else {
        debug!(
            "{} {} lines from {} segments",
            coordinates.len(),
            axis,
            segments.len()
        );
    }
    for position in coordinates.as_slice() {
        match axis {
            Axis::Horizontal => debug!("horizontal line at y = {}", position),
            Axis::Vertical => debug!("vertical line at x = {}", position),
        }
    }

    LineDetection {
        axis,
        segments,
        coordinates,
    }
}

/// Builds the binary mask of long runs along `axis`.
pub fn line_mask(section: &RgbImage, axis: Axis, config: &LineDetectionConfig) -> GrayImage {
    let gray = grayscale(section);
    let gray = match config.blur_sigma {
        Some(sigma) => gaussian_blur_f32(&gray, sigma),
        None => gray,
    };
    let binary = binarize_inverted(&gray);

    let morphology = &config.morphology;
    let mut mask = open_rect(&binary, morphology.kernel);
    if morphology.close {
        mask = close_rect(&mask, morphology.kernel);
    }
    if let Some(bridge) = &morphology.bridge {
        for _ in 0..bridge.iterations {
            mask = dilate_rect(&mask, bridge.kernel);
        }
    }
    debug!("built {} line mask", axis);
    mask
}

/// Extracts near-axis segments from a line mask.
pub fn find_segments(mask: &GrayImage, axis: Axis, config: &LineDetectionConfig) -> Vec<Segment> {
    let options = LineDetectionOptions {
        vote_threshold: config.segments.vote_threshold,
        suppression_radius: config.segments.suppression_radius,
    };

    let mut segments = hough::detect_lines(mask, options)
        .into_iter()
        .filter(|line| polar_line_runs_along(line, axis, config.angle_tolerance))
        .flat_map(|line| walk_polar_line(mask, &line, &config.segments))
        .filter(|segment| {
            segment.length() >= config.segments.min_line_length as f32
                && segment.is_near_axis(axis, config.angle_tolerance)
        })
        .collect::<Vec<Segment>>();

    segments.sort_by_key(|s| (s.start.y, s.start.x, s.end.y, s.end.x));
    segments.dedup();
    segments
}

/// Whether a Hough line is within `tolerance` degrees of `axis`. The polar
/// angle is that of the line's normal: 90° for horizontal lines, 0° (or
/// nearly 180°) for vertical ones.
fn polar_line_runs_along(line: &PolarLine, axis: Axis, tolerance: f32) -> bool {
    let angle = line.angle_in_degrees as f32;
    match axis {
        Axis::Horizontal => (angle - 90.0).abs() <= tolerance,
        Axis::Vertical => angle <= tolerance || angle >= 180.0 - tolerance,
    }
}

/// Walks an infinite Hough line across the mask and returns the runs of
/// foreground it passes over, split wherever more than `max_line_gap`
/// consecutive samples miss.
fn walk_polar_line(mask: &GrayImage, line: &PolarLine, config: &SegmentConfig) -> Vec<Segment> {
    let (width, height) = mask.dimensions();
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (sin, cos) = theta.sin_cos();
    // Step along whichever image axis the line is closer to, so every step
    // advances one pixel.
    let steps_along_x = sin.abs() >= cos.abs();

    let samples = if steps_along_x { width } else { height };
    let mut hits: Vec<(u32, Point<u32>)> = Vec::new();
    for t in 0..samples {
        let point = if steps_along_x {
            let y = ((line.r - t as f32 * cos) / sin).round();
            Point::new(t as f32, y)
        } else {
            let x = ((line.r - t as f32 * sin) / cos).round();
            Point::new(x, t as f32)
        };
        if point.x < 0.0 || point.y < 0.0 {
            continue;
        }
        let point = Point::new(point.x as u32, point.y as u32);
        if point.x >= width || point.y >= height {
            continue;
        }
        if is_on_line(mask, point, steps_along_x, config.band) {
            hits.push((t, point));
        }
    }

    let mut segments = Vec::new();
    // (start, index of last hit, last hit)
    let mut run: Option<(Point<u32>, u32, Point<u32>)> = None;
    for (t, point) in hits {
        run = match run {
            Some((start, last, end)) if t - last > config.max_line_gap.saturating_add(1) => {
                segments.push(Segment::new(start, end));
                Some((point, t, point))
            }
            Some((start, _, _)) => Some((start, t, point)),
            None => Some((point, t, point)),
        };
    }
    if let Some((start, _, end)) = run {
        segments.push(Segment::new(start, end));
    }
    segments
}

/// Whether the mask has foreground at `point` or within `band` pixels of it,
/// measured across the walking direction.
fn is_on_line(mask: &GrayImage, point: Point<u32>, steps_along_x: bool, band: u32) -> bool {
    let (width, height) = mask.dimensions();
    let (center, limit) = if steps_along_x {
        (point.y, height)
    } else {
        (point.x, width)
    };
    let lo = center.saturating_sub(band);
    let hi = (center + band).min(limit - 1);
    (lo..=hi).any(|offset| {
        let (x, y) = if steps_along_x {
            (point.x, offset)
        } else {
            (offset, point.y)
        };
        mask.get_pixel(x, y).0[0] > 0
    })
}
