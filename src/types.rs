use std::fmt::Display;

use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

// Defines a new type that wraps a String for use as an ID.
macro_rules! idtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

idtype!(SectionId);

/// The direction grid lines run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Lines of constant y; they separate rows.
    Horizontal,
    /// Lines of constant x; they separate columns.
    Vertical,
}

impl Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Horizontal => write!(f, "horizontal"),
            Axis::Vertical => write!(f, "vertical"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size<T> {
    pub width: T,
    pub height: T,
}

/// A literal pixel rectangle on the sheet canvas.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelBounds {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBounds {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Whether the rectangle is non-empty and lies entirely inside a canvas of
    /// the given size.
    pub fn fits_within(&self, canvas: Size<u32>) -> bool {
        self.width > 0
            && self.height > 0
            && self.left.checked_add(self.width).map_or(false, |r| r <= canvas.width)
            && self.top.checked_add(self.height).map_or(false, |b| b <= canvas.height)
    }

    pub fn to_rect(&self) -> Rect {
        Rect::at(self.left as i32, self.top as i32).of_size(self.width, self.height)
    }
}

impl Display for PixelBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// A circular mark found in a section image. Positions are relative to the
/// section crop.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bubble {
    pub x: u32,
    pub y: u32,
    pub radius: u32,
}

impl Bubble {
    /// Snaps a fitted circle to whole pixels. Negative values clamp to zero.
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        let to_pixel = |v: f32| v.round().max(0.0) as u32;
        Self {
            x: to_pixel(x),
            y: to_pixel(y),
            radius: to_pixel(radius),
        }
    }
}

/// A half-open pixel interval `[start, end)` between two adjacent grid lines.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundaryRange {
    pub start: u32,
    pub end: u32,
}

impl BoundaryRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, p: u32) -> bool {
        self.start <= p && p < self.end
    }
}

/// Grid line positions along one axis, strictly increasing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LineCoordinates(Vec<u32>);

impl LineCoordinates {
    /// Collapses raw line observations into one position per grid line.
    ///
    /// Observations are sorted, then scanned left to right: a value is kept
    /// only if it lies more than `merge_distance` past the last kept value.
    /// The first observation of every cluster therefore represents it.
    pub fn merge(mut raw: Vec<u32>, merge_distance: u32) -> Self {
        raw.sort_unstable();
        let mut kept: Vec<u32> = Vec::with_capacity(raw.len());
        for value in raw {
            match kept.last() {
                Some(&last) if value.abs_diff(last) <= merge_distance => {}
                _ => kept.push(value),
            }
        }
        Self(kept)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The ranges between consecutive lines; `n` lines bound `n - 1` ranges.
    pub fn ranges(&self) -> Vec<BoundaryRange> {
        self.0
            .windows(2)
            .map(|w| BoundaryRange::new(w[0], w[1]))
            .collect()
    }
}

/// A 1-based grid cell. Cells order row-major.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Cell {
    pub row: u32,
    pub column: u32,
}

impl Cell {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(row {}, column {})", self.row, self.column)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn merges_close_observations() {
        let coordinates = LineCoordinates::merge(vec![95, 12, 50, 15, 92], 10);
        assert_eq!(coordinates.as_slice(), &[12, 50, 92]);
        assert_eq!(
            coordinates.ranges(),
            vec![BoundaryRange::new(12, 50), BoundaryRange::new(50, 92)]
        );
    }

    #[test]
    fn merge_compares_against_last_kept_value() {
        // 21 is within 10 of 15 but not of 5; greedy merging keeps it because
        // 15 was itself merged away.
        let coordinates = LineCoordinates::merge(vec![5, 15, 21], 10);
        assert_eq!(coordinates.as_slice(), &[5, 21]);
    }

    #[test]
    fn no_lines_means_no_ranges() {
        assert!(LineCoordinates::merge(vec![], 10).ranges().is_empty());
        assert!(LineCoordinates::merge(vec![42], 10).ranges().is_empty());
    }

    #[test]
    fn bubble_snaps_to_pixels() {
        assert_eq!(
            Bubble::new(10.4, 19.6, 7.5),
            Bubble {
                x: 10,
                y: 20,
                radius: 8
            }
        );
        assert_eq!(Bubble::new(-3.0, 2.0, -1.0).x, 0);
    }

    #[test]
    fn bounds_fit_canvas() {
        let canvas = Size {
            width: 800,
            height: 1000,
        };
        assert!(PixelBounds::new(530, 222, 220, 130).fits_within(canvas));
        assert!(PixelBounds::new(600, 0, 200, 1000).fits_within(canvas));
        assert!(!PixelBounds::new(601, 0, 200, 10).fits_within(canvas));
        assert!(!PixelBounds::new(0, 0, 0, 10).fits_within(canvas));
        assert!(!PixelBounds::new(u32::MAX, 0, 2, 10).fits_within(canvas));
    }

    proptest! {
        #[test]
        fn merged_coordinates_are_spaced_subsequence(
            raw in prop::collection::vec(0u32..500, 0..60),
            merge_distance in 0u32..30,
        ) {
            let mut sorted = raw.clone();
            sorted.sort_unstable();
            let merged = LineCoordinates::merge(raw, merge_distance);
            let merged = merged.as_slice();

            for w in merged.windows(2) {
                prop_assert!(w[1] > w[0]);
                prop_assert!(w[1] - w[0] > merge_distance);
            }

            // every kept value appears in the sorted input, in order
            let mut rest = sorted.iter();
            for value in merged {
                prop_assert!(rest.any(|v| v == value));
            }
        }

        #[test]
        fn points_fall_in_at_most_one_range(
            raw in prop::collection::vec(0u32..500, 0..30),
            p in 0u32..520,
        ) {
            let ranges = LineCoordinates::merge(raw, 10).ranges();
            let hits = ranges.iter().filter(|r| r.contains(p)).count();
            prop_assert!(hits <= 1);

            for (i, range) in ranges.iter().enumerate() {
                prop_assert!(!range.contains(range.end));
                if let Some(next) = ranges.get(i + 1) {
                    prop_assert!(next.contains(range.end));
                }
            }
        }
    }
}
