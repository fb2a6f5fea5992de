//! Filled-bubble detection with a gradient Hough circle transform.
//!
//! Every edge pixel votes along its gradient direction (both ways) at each
//! distance in the radius band. Edges of a circle point at its center, so
//! their votes pile up there while straight edges spread theirs along a
//! band. Centers are accumulator peaks; each one's radius is the distance
//! most edge pixels agree on.
//!
//! The outline of an empty printed cell can look like a circle to the
//! transform, so a candidate only counts once the ink inside it shows the
//! disc is actually filled in.

use std::f32::consts::PI;

use image::{GrayImage, RgbImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::point::Point;
use log::debug;
use logging_timer::time;

use crate::config::BubbleDetectionConfig;
use crate::geometry::distance_from_point_to_point;
use crate::image_utils::{binarize_inverted, grayscale};
use crate::types::Bubble;

/// Number of angular sectors used to judge how much of a circle's outline
/// is present.
const ARC_SECTORS: u32 = 8;

/// Edge pixels count toward a radius only if their gradient points within
/// about 30° of the center, which straight edges do only near their foot.
const MIN_RADIAL_ALIGNMENT: f32 = 0.87;

/// Fill is sampled on a ring at this share of the fitted radius, inside the
/// anti-aliased rim. Crossing grid lines ink only four short arcs of it.
const FILL_SAMPLE_SCALE: f32 = 0.75;

/// Points sampled on the fill ring.
const FILL_SAMPLES: u32 = 32;

/// A circle before snapping to whole pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point<f32>,
    pub radius: f32,
    /// Accumulator votes at the center.
    pub votes: u32,
}

/// Finds circular marks in a section image, strongest first.
///
/// All circles are returned whether or not they sit inside the grid.
#[time]
pub fn detect_bubbles(section: &RgbImage, config: &BubbleDetectionConfig) -> Vec<Bubble> {
    let gray = grayscale(section);
    let ink = binarize_inverted(&gray);
    let gray = gaussian_blur_f32(&gray, config.blur_sigma);
    let bubbles = find_circles(&gray, &ink, config)
        .into_iter()
        .map(|circle| {
            let bubble = Bubble::new(circle.center.x, circle.center.y, circle.radius);
            debug!(
                "circle at ({}, {}) radius {} with {} votes",
                bubble.x, bubble.y, bubble.radius, circle.votes
            );
            bubble
        })
        .collect::<Vec<Bubble>>();

    if bubbles.is_empty() {
        debug!("no circles detected");
    }
    bubbles
}

struct EdgePoint {
    position: Point<f32>,
    /// Unit gradient direction.
    direction: (f32, f32),
}

/// Runs the circle transform over a smoothed grayscale image. `ink` is the
/// binarized section, foreground white, used to confirm candidates are filled.
pub fn find_circles(
    gray: &GrayImage,
    ink: &GrayImage,
    config: &BubbleDetectionConfig,
) -> Vec<Circle> {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let edge_points = edge_points(gray, config.edge_threshold);
    let accumulator = Accumulator::vote(width, height, &edge_points, config);

    let mut circles: Vec<Circle> = Vec::new();
    for (votes, center) in accumulator.peaks(config.accumulator_threshold) {
        if circles
            .iter()
            .any(|c| distance_from_point_to_point(&c.center, &center) < config.min_distance)
        {
            continue;
        }

        let Some((radius, support, sectors)) = fit_radius(&edge_points, center, config) else {
            continue;
        };
        if support < config.accumulator_threshold || sectors < config.min_arc_sectors {
            debug!(
                "rejected circle candidate at ({:.1}, {:.1}): support {}, {} of {} sectors",
                center.x, center.y, support, sectors, ARC_SECTORS
            );
            continue;
        }

        let fill = fill_ratio(ink, center, radius * FILL_SAMPLE_SCALE);
        if fill < config.min_fill_ratio {
            debug!(
                "rejected unfilled circle at ({:.1}, {:.1}) radius {:.1}: {:.0}% ink",
                center.x,
                center.y,
                radius,
                fill * 100.0
            );
            continue;
        }

        circles.push(Circle {
            center,
            radius,
            votes,
        });
    }
    circles
}

fn edge_points(gray: &GrayImage, edge_threshold: f32) -> Vec<EdgePoint> {
    let edges = canny(gray, edge_threshold / 2.0, edge_threshold);
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .filter_map(|(x, y, _)| {
            let dx = gx.get_pixel(x, y).0[0] as f32;
            let dy = gy.get_pixel(x, y).0[0] as f32;
            let magnitude = (dx * dx + dy * dy).sqrt();
            if magnitude < f32::EPSILON {
                return None;
            }
            Some(EdgePoint {
                position: Point::new(x as f32, y as f32),
                direction: (dx / magnitude, dy / magnitude),
            })
        })
        .collect()
}

/// Center votes on a grid of `cell`-sized bins.
struct Accumulator {
    width: usize,
    height: usize,
    cell: f32,
    votes: Vec<u32>,
}

impl Accumulator {
    fn vote(
        image_width: u32,
        image_height: u32,
        edge_points: &[EdgePoint],
        config: &BubbleDetectionConfig,
    ) -> Self {
        let cell = config.inverse_resolution;
        let width = (image_width as f32 / cell).ceil() as usize;
        let height = (image_height as f32 / cell).ceil() as usize;
        let mut accumulator = Self {
            width,
            height,
            cell,
            votes: vec![0; width * height],
        };

        for edge in edge_points {
            for sign in [1.0f32, -1.0] {
                let mut last = None;
                for r in config.min_radius..=config.max_radius {
                    let distance = sign * r as f32;
                    let x = edge.position.x + edge.direction.0 * distance;
                    let y = edge.position.y + edge.direction.1 * distance;
                    match accumulator.index_of(x, y) {
                        // a ray crosses a bin once no matter how many steps land in it
                        Some(index) if last != Some(index) => {
                            accumulator.votes[index] += 1;
                            last = Some(index);
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }
        accumulator
    }

    fn index_of(&self, x: f32, y: f32) -> Option<usize> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let (cx, cy) = ((x / self.cell) as usize, (y / self.cell) as usize);
        (cx < self.width && cy < self.height).then(|| cy * self.width + cx)
    }

    /// Votes in the 2x2 block of bins whose top-left bin is `(cx, cy)`, so a
    /// center on a bin boundary is not split across bins.
    fn block_votes(&self, cx: usize, cy: usize) -> u32 {
        let mut total = 0;
        for y in cy..(cy + 2).min(self.height) {
            for x in cx..(cx + 2).min(self.width) {
                total += self.votes[y * self.width + x];
            }
        }
        total
    }

    /// Vote-weighted centroid of a 2x2 block, in image pixels.
    fn block_center(&self, cx: usize, cy: usize) -> Point<f32> {
        let (mut sx, mut sy, mut total) = (0.0f32, 0.0f32, 0.0f32);
        for y in cy..(cy + 2).min(self.height) {
            for x in cx..(cx + 2).min(self.width) {
                let v = self.votes[y * self.width + x] as f32;
                sx += v * (x as f32 + 0.5);
                sy += v * (y as f32 + 0.5);
                total += v;
            }
        }
        if total == 0.0 {
            return Point::new((cx as f32 + 0.5) * self.cell, (cy as f32 + 0.5) * self.cell);
        }
        Point::new(sx / total * self.cell, sy / total * self.cell)
    }

    /// Local maxima of block votes at or above `threshold`, strongest first.
    /// Ties go to the earlier bin in scan order.
    fn peaks(&self, threshold: u32) -> Vec<(u32, Point<f32>)> {
        let blocks = (0..self.height)
            .flat_map(|cy| (0..self.width).map(move |cx| (cx, cy)))
            .map(|(cx, cy)| self.block_votes(cx, cy))
            .collect::<Vec<u32>>();

        let mut peaks = Vec::new();
        for cy in 0..self.height {
            for cx in 0..self.width {
                let index = cy * self.width + cx;
                let value = blocks[index];
                if value == 0 || value < threshold {
                    continue;
                }
                let is_peak = neighbors(cx, cy, self.width, self.height).all(|n| {
                    let other = blocks[n];
                    other < value || (other == value && n > index)
                });
                if is_peak {
                    peaks.push((value, index, self.block_center(cx, cy)));
                }
            }
        }

        peaks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        peaks
            .into_iter()
            .map(|(value, _, center)| (value, center))
            .collect()
    }
}

fn neighbors(cx: usize, cy: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let xs = cx.saturating_sub(1)..=(cx + 1).min(width - 1);
    let ys = cy.saturating_sub(1)..=(cy + 1).min(height - 1);
    ys.flat_map(move |y| xs.clone().map(move |x| (x, y)))
        .filter(move |&(x, y)| (x, y) != (cx, cy))
        .map(move |(x, y)| y * width + x)
}

/// Picks the radius in the band that the most radially aligned edge pixels
/// agree on, weighting by `1 / r` so large radii don't win just by having
/// more circumference.
///
/// Returns the radius, the number of supporting edge pixels and how many of
/// the angular sectors around the center those pixels reach.
fn fit_radius(
    edge_points: &[EdgePoint],
    center: Point<f32>,
    config: &BubbleDetectionConfig,
) -> Option<(f32, u32, u32)> {
    let min = config.min_radius as f32;
    let max = config.max_radius as f32;
    let distances = edge_points
        .iter()
        .map(|edge| (edge, distance_from_point_to_point(&edge.position, &center)))
        .filter(|(_, d)| *d >= min - 1.0 && *d <= max + 1.0)
        .filter(|(edge, d)| {
            let radial = (
                (edge.position.x - center.x) / d,
                (edge.position.y - center.y) / d,
            );
            (edge.direction.0 * radial.0 + edge.direction.1 * radial.1).abs()
                >= MIN_RADIAL_ALIGNMENT
        })
        .collect::<Vec<_>>();

    let mut best: Option<(f32, u32)> = None;
    for r in config.min_radius..=config.max_radius {
        let r = r as f32;
        let support = distances
            .iter()
            .filter(|(_, d)| (d - r).abs() <= 1.0)
            .count() as u32;
        let better = match best {
            Some((best_r, best_support)) => support as f32 / r > best_support as f32 / best_r,
            None => support > 0,
        };
        if better {
            best = Some((r, support));
        }
    }
    let (r, support) = best?;

    let supporting = distances
        .iter()
        .filter(|(_, d)| (d - r).abs() <= 1.0)
        .collect::<Vec<_>>();
    let radius = supporting.iter().map(|(_, d)| d).sum::<f32>() / supporting.len() as f32;

    let mut sectors = 0u32;
    for (edge, _) in &supporting {
        let angle = (edge.position.y - center.y).atan2(edge.position.x - center.x);
        let sector = (((angle + PI) / (2.0 * PI)) * ARC_SECTORS as f32) as u32 % ARC_SECTORS;
        sectors |= 1 << sector;
    }

    Some((radius, support, sectors.count_ones()))
}

/// Share of points on the circle of `radius` around `center` that land on
/// foreground pixels of `ink`. Points outside the image count as background.
fn fill_ratio(ink: &GrayImage, center: Point<f32>, radius: f32) -> f32 {
    let (width, height) = ink.dimensions();
    let filled = (0..FILL_SAMPLES)
        .filter(|i| {
            let angle = 2.0 * PI * *i as f32 / FILL_SAMPLES as f32;
            let x = (center.x + radius * angle.cos()).round();
            let y = (center.y + radius * angle.sin()).round();
            x >= 0.0
                && y >= 0.0
                && (x as u32) < width
                && (y as u32) < height
                && ink.get_pixel(x as u32, y as u32).0[0] > 0
        })
        .count();
    filled as f32 / FILL_SAMPLES as f32
}
