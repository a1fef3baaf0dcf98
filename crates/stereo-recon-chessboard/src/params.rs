use serde::{Deserialize, Serialize};
use stereo_recon_core::PatternSpec;

/// Neighbor-graph settings. Spacing limits are relative to the median
/// nearest-neighbor distance of the surviving candidates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_ratio: f32,
    pub max_spacing_ratio: f32,
    pub k_neighbors: usize,
    /// Maximum angle between an edge and the grid axis it is assigned to.
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_ratio: 0.5,
            max_spacing_ratio: 1.7,
            k_neighbors: 8,
            orientation_tolerance_deg: 25.0,
        }
    }
}

/// Coarse-stage binarization and fast-rejection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdParams {
    /// Odd side length of the local-mean window.
    pub block_size: usize,
    /// Subtracted from the local mean before comparison.
    pub offset: i32,
    /// Minimal share of pixels on each side of the global Otsu split.
    pub min_phase_fraction: f32,
    /// Minimal distance between the two Otsu class means, in gray levels.
    pub min_contrast: f32,
    /// Radius of the binary ring sampled around each candidate.
    pub ring_radius: f32,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            block_size: 15,
            offset: 2,
            min_phase_fraction: 0.05,
            min_contrast: 30.0,
            ring_radius: 4.0,
        }
    }
}

/// Sub-pixel refinement: window half-size and termination.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half window; 5 gives the 11x11 neighborhood.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once a step moves the corner by less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 0.1,
        }
    }
}

/// Parameters of the checkerboard detector.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChessboardParams {
    pub pattern: PatternSpec,

    #[serde(default)]
    pub threshold: ThresholdParams,

    #[serde(default)]
    pub graph: GridGraphParams,

    #[serde(default)]
    pub subpix: SubPixParams,

    /// Relative ChESS response threshold handed to `chess-corners`.
    #[serde(default = "default_chess_threshold_rel")]
    pub chess_threshold_rel: f32,

    #[serde(default = "default_chess_nms_radius")]
    pub chess_nms_radius: u32,

    /// Run the coarse stage on an image downscaled by this factor (<= 1.0);
    /// refinement always runs at full resolution.
    #[serde(default = "default_scale")]
    pub coarse_scale: f32,
}

fn default_chess_threshold_rel() -> f32 {
    0.2
}

fn default_chess_nms_radius() -> u32 {
    2
}

fn default_scale() -> f32 {
    1.0
}

impl ChessboardParams {
    /// Defaults for a given pattern.
    pub fn for_pattern(pattern: PatternSpec) -> Self {
        Self {
            pattern,
            threshold: ThresholdParams::default(),
            graph: GridGraphParams::default(),
            subpix: SubPixParams::default(),
            chess_threshold_rel: default_chess_threshold_rel(),
            chess_nms_radius: default_chess_nms_radius(),
            coarse_scale: default_scale(),
        }
    }
}
