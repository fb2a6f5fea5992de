use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grid::CellConflictPolicy;
use crate::image_utils::KernelSize;
use crate::interpret::InterpretError;
use crate::scoring::RowMarkPolicy;
use crate::types::Axis;

/// Extra dilation applied after the directional opening to reconnect line
/// pieces that a bubble drawn over the line split apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub kernel: KernelSize,
    pub iterations: u32,
}

/// Directional morphology used to isolate grid lines of one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphologyConfig {
    /// Opening kernel; elongated along the line direction.
    pub kernel: KernelSize,
    /// Whether to follow the opening with a closing using the same kernel.
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub bridge: Option<BridgeConfig>,
}

/// Parameters of the segment transform run over the line mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentConfig {
    /// Minimum Hough accumulator votes for a candidate line.
    pub vote_threshold: u32,
    /// Non-maximum suppression radius in the (distance, angle) accumulator.
    pub suppression_radius: u32,
    /// Segments shorter than this (in pixels) are discarded.
    pub min_line_length: u32,
    /// Largest run of missing pixels a segment may span.
    pub max_line_gap: u32,
    /// Pixels within this distance across the line count as on it.
    pub band: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDetectionConfig {
    /// Gaussian smoothing applied before binarization, if any.
    #[serde(default)]
    pub blur_sigma: Option<f32>,
    pub morphology: MorphologyConfig,
    pub segments: SegmentConfig,
    /// Maximum tilt, in degrees, of an accepted segment.
    pub angle_tolerance: f32,
    /// Line observations this close to the previous kept line are merged.
    pub merge_distance: u32,
}

impl LineDetectionConfig {
    /// Calibrated for the printed row separators. The wide kernel ignores
    /// bubbles; closing and bridging reconnect lines that a mark interrupts.
    pub fn horizontal() -> Self {
        Self {
            // OpenCV's sigma for a 3x3 kernel
            blur_sigma: Some(0.8),
            morphology: MorphologyConfig {
                kernel: KernelSize::new(40, 1),
                close: true,
                bridge: Some(BridgeConfig {
                    kernel: KernelSize::new(10, 1),
                    iterations: 1,
                }),
            },
            segments: SegmentConfig {
                vote_threshold: 30,
                suppression_radius: 4,
                min_line_length: 8,
                max_line_gap: 1000,
                band: 1,
            },
            angle_tolerance: 5.0,
            merge_distance: 10,
        }
    }

    /// Calibrated for the printed column separators.
    pub fn vertical() -> Self {
        Self {
            blur_sigma: None,
            morphology: MorphologyConfig {
                kernel: KernelSize::new(1, 15),
                close: false,
                bridge: None,
            },
            segments: SegmentConfig {
                vote_threshold: 6,
                suppression_radius: 4,
                min_line_length: 20,
                max_line_gap: 300,
                band: 1,
            },
            angle_tolerance: 5.0,
            merge_distance: 10,
        }
    }

    pub fn for_axis(axis: Axis) -> Self {
        match axis {
            Axis::Horizontal => Self::horizontal(),
            Axis::Vertical => Self::vertical(),
        }
    }

    fn validate(&self, axis: Axis) -> Result<(), String> {
        if let Some(sigma) = self.blur_sigma {
            if !(sigma > 0.0) {
                return Err(format!("{} blurSigma must be positive, got {}", axis, sigma));
            }
        }
        let kernels = std::iter::once(self.morphology.kernel)
            .chain(self.morphology.bridge.iter().map(|b| b.kernel));
        for kernel in kernels {
            if kernel.width == 0 || kernel.height == 0 {
                return Err(format!("{} morphology kernels must be at least 1x1", axis));
            }
        }
        if !(0.0..=90.0).contains(&self.angle_tolerance) {
            return Err(format!(
                "{} angleTolerance must be within 0..=90 degrees, got {}",
                axis, self.angle_tolerance
            ));
        }
        Ok(())
    }
}

/// Parameters of the gradient Hough circle transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BubbleDetectionConfig {
    pub blur_sigma: f32,
    /// Accumulator cell size in pixels (inverse accumulator resolution).
    pub inverse_resolution: f32,
    /// Minimum distance between accepted circle centers.
    pub min_distance: f32,
    /// Upper Canny threshold; the lower one is half of it.
    pub edge_threshold: f32,
    /// Minimum center votes; lower finds more circles, including false ones.
    pub accumulator_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
    /// How many of the eight 45° sectors around a center the supporting edge
    /// pixels must reach; rejects corners and line bands.
    pub min_arc_sectors: u32,
    /// Share of a ring inside the fitted circle that must be ink; empty
    /// printed cells and hollow outlines fall below it.
    pub min_fill_ratio: f32,
}

impl Default for BubbleDetectionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            inverse_resolution: 1.5,
            min_distance: 10.0,
            edge_threshold: 50.0,
            accumulator_threshold: 30,
            min_radius: 5,
            max_radius: 14,
            min_arc_sectors: 6,
            min_fill_ratio: 0.5,
        }
    }
}

impl BubbleDetectionConfig {
    fn validate(&self) -> Result<(), String> {
        if !(self.blur_sigma > 0.0) {
            return Err(format!("bubbles blurSigma must be positive, got {}", self.blur_sigma));
        }
        if !(self.inverse_resolution >= 1.0) {
            return Err(format!(
                "bubbles inverseResolution must be at least 1, got {}",
                self.inverse_resolution
            ));
        }
        if self.min_radius == 0 || self.min_radius > self.max_radius {
            return Err(format!(
                "bubbles radius band {}..={} is empty",
                self.min_radius, self.max_radius
            ));
        }
        if self.min_arc_sectors > 8 {
            return Err(format!(
                "bubbles minArcSectors must be at most 8, got {}",
                self.min_arc_sectors
            ));
        }
        if !(0.0..=1.0).contains(&self.min_fill_ratio) {
            return Err(format!(
                "bubbles minFillRatio must be within 0..=1, got {}",
                self.min_fill_ratio
            ));
        }
        if !(self.edge_threshold > 0.0) {
            return Err(format!(
                "bubbles edgeThreshold must be positive, got {}",
                self.edge_threshold
            ));
        }
        Ok(())
    }
}

/// Everything the section pipeline can be tuned with.
///
/// When read from JSON, every field may be left out and takes its default.
/// The two axes default differently, so an axis object is laid over that
/// axis's defaults key by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "DetectorConfigFile")]
pub struct DetectorConfig {
    pub horizontal: LineDetectionConfig,
    pub vertical: LineDetectionConfig,
    pub bubbles: BubbleDetectionConfig,
    pub cell_conflict_policy: CellConflictPolicy,
    pub row_mark_policy: RowMarkPolicy,
}

/// `DetectorConfig` as written in a config file.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectorConfigFile {
    horizontal: Option<Value>,
    vertical: Option<Value>,
    #[serde(default)]
    bubbles: BubbleDetectionConfig,
    #[serde(default)]
    cell_conflict_policy: CellConflictPolicy,
    #[serde(default)]
    row_mark_policy: RowMarkPolicy,
}

impl TryFrom<DetectorConfigFile> for DetectorConfig {
    type Error = serde_json::Error;

    fn try_from(file: DetectorConfigFile) -> Result<Self, Self::Error> {
        Ok(Self {
            horizontal: overlay_axis(Axis::Horizontal, file.horizontal)?,
            vertical: overlay_axis(Axis::Vertical, file.vertical)?,
            bubbles: file.bubbles,
            cell_conflict_policy: file.cell_conflict_policy,
            row_mark_policy: file.row_mark_policy,
        })
    }
}

fn overlay_axis(
    axis: Axis,
    overrides: Option<Value>,
) -> Result<LineDetectionConfig, serde_json::Error> {
    let defaults = LineDetectionConfig::for_axis(axis);
    let Some(overrides) = overrides else {
        return Ok(defaults);
    };
    let mut merged = serde_json::to_value(defaults)?;
    merge_json(&mut merged, overrides);
    serde_json::from_value(merged)
}

/// Recursively replaces values in `base` with those in `overrides`. Objects
/// merge key by key; anything else is replaced outright.
fn merge_json(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overrides) => *base = overrides,
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            horizontal: LineDetectionConfig::horizontal(),
            vertical: LineDetectionConfig::vertical(),
            bubbles: BubbleDetectionConfig::default(),
            cell_conflict_policy: CellConflictPolicy::default(),
            row_mark_policy: RowMarkPolicy::default(),
        }
    }
}

impl DetectorConfig {
    pub fn lines(&self, axis: Axis) -> &LineDetectionConfig {
        match axis {
            Axis::Horizontal => &self.horizontal,
            Axis::Vertical => &self.vertical,
        }
    }

    /// Rejects values the detectors cannot run with.
    pub fn validate(&self) -> Result<(), InterpretError> {
        self.horizontal
            .validate(Axis::Horizontal)
            .and_then(|_| self.vertical.validate(Axis::Vertical))
            .and_then(|_| self.bubbles.validate())
            .map_err(InterpretError::InvalidConfig)
    }
}

/// Reads and parses a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let json = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&json).map_err(|e| e.to_string())
}

/// Loads and validates a detector configuration file.
pub fn load_config(path: &Path) -> Result<DetectorConfig, InterpretError> {
    let config: DetectorConfig =
        read_json(path).map_err(|e| InterpretError::ConfigError(path.to_path_buf(), e))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn axis_defaults_differ() {
        let config = DetectorConfig::default();
        assert_eq!(config.lines(Axis::Horizontal).morphology.kernel, KernelSize::new(40, 1));
        assert_eq!(config.lines(Axis::Vertical).morphology.kernel, KernelSize::new(1, 15));
        assert!(config.vertical.blur_sigma.is_none());
        assert_eq!(LineDetectionConfig::for_axis(Axis::Vertical), config.vertical);
    }

    #[test]
    fn rejects_empty_radius_band() {
        let mut config = DetectorConfig::default();
        config.bubbles.min_radius = 20;
        assert!(matches!(
            config.validate(),
            Err(InterpretError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_kernel() {
        let mut config = DetectorConfig::default();
        config.horizontal.morphology.kernel = KernelSize::new(0, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DetectorConfig = serde_json::from_str(
            r#"{ "bubbles": { "accumulatorThreshold": 12 }, "cellConflictPolicy": "first-wins" }"#,
        )
        .unwrap();
        assert_eq!(config.bubbles.accumulator_threshold, 12);
        assert_eq!(config.bubbles.max_radius, 14);
        assert_eq!(config.cell_conflict_policy, CellConflictPolicy::FirstWins);
        assert_eq!(config.horizontal, LineDetectionConfig::horizontal());
    }

    #[test]
    fn axis_json_overrides_single_fields() {
        let config: DetectorConfig = serde_json::from_str(
            r#"{
                "horizontal": { "mergeDistance": 12, "segments": { "voteThreshold": 40 } },
                "vertical": { "blurSigma": 1.5 }
            }"#,
        )
        .unwrap();

        let mut horizontal = LineDetectionConfig::horizontal();
        horizontal.merge_distance = 12;
        horizontal.segments.vote_threshold = 40;
        assert_eq!(config.horizontal, horizontal);

        let mut vertical = LineDetectionConfig::vertical();
        vertical.blur_sigma = Some(1.5);
        assert_eq!(config.vertical, vertical);
        assert_eq!(config.bubbles, BubbleDetectionConfig::default());
    }

    #[test]
    fn axis_json_rejects_bad_types() {
        let result = serde_json::from_str::<DetectorConfig>(
            r#"{ "vertical": { "mergeDistance": "wide" } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_json_is_default() {
        let config: DetectorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DetectorConfig::default());
    }

    #[test]
    fn rejects_fill_ratio_above_one() {
        let mut config = DetectorConfig::default();
        config.bubbles.min_fill_ratio = 1.5;
        assert!(matches!(
            config.validate(),
            Err(InterpretError::InvalidConfig(_))
        ));
    }

    #[test]
    fn loads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "rowMarkPolicy": "sum" }}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.row_mark_policy, RowMarkPolicy::Sum);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "not json").unwrap();
        assert!(matches!(
            load_config(bad.path()),
            Err(InterpretError::ConfigError(_, _))
        ));
    }
}
