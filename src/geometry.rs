use imageproc::point::Point;

use crate::types::Axis;

/// A straight line segment between two pixel positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: Point<u32>,
    pub end: Point<u32>,
}

impl Segment {
    pub fn new(start: Point<u32>, end: Point<u32>) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f32 {
        let dx = self.end.x as f32 - self.start.x as f32;
        let dy = self.end.y as f32 - self.start.y as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// Unsigned angle between the segment direction and the x-axis, in
    /// degrees within `[0, 180]`.
    pub fn angle_degrees(&self) -> f32 {
        let dx = self.end.x as f32 - self.start.x as f32;
        let dy = self.end.y as f32 - self.start.y as f32;
        dy.atan2(dx).to_degrees().abs()
    }

    /// Whether the segment runs along `axis`, allowing `tolerance` degrees of
    /// tilt. The comparison is strict on both sides.
    pub fn is_near_axis(&self, axis: Axis, tolerance: f32) -> bool {
        let angle = self.angle_degrees();
        match axis {
            Axis::Horizontal => angle < tolerance || angle > 180.0 - tolerance,
            Axis::Vertical => angle > 90.0 - tolerance && angle < 90.0 + tolerance,
        }
    }

    /// The segment's position across `axis`: mean y of the endpoints for
    /// horizontal lines, mean x for vertical ones, rounded down.
    pub fn axis_position(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Horizontal => (self.start.y + self.end.y) / 2,
            Axis::Vertical => (self.start.x + self.end.x) / 2,
        }
    }
}

pub fn distance_from_point_to_point(p1: &Point<f32>, p2: &Point<f32>) -> f32 {
    ((p1.x - p2.x).powi(2) + (p1.y - p2.y).powi(2)).sqrt()
}
