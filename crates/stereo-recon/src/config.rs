//! JSON-backed configuration of the calibrate and reconstruct stages.

use crate::ReconstructError;
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use stereo_recon_calib::{StereoCalibrationParams, DEFAULT_ALPHA};
use stereo_recon_chessboard::ChessboardParams;
use stereo_recon_cloud::WriteOptions;
use stereo_recon_core::{read_json, ImageSize, PatternSpec};
use stereo_recon_disparity::{BlockCost, DisparityParams, MatcherKind, QualityWindows};

/// Load a configuration document.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ReconstructError> {
    let path = path.as_ref();
    debug!("loading {}", path.display());
    Ok(read_json(path)?)
}

/// Write a configuration document as pretty JSON, replacing `path` atomically.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ReconstructError> {
    Ok(stereo_recon_core::write_json(value, path)?)
}

/// Optional resampling applied to every input image before processing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeSpec {
    /// Multiply both sides by this factor.
    Scale(f64),
    /// Resample to an exact size.
    Size { width: usize, height: usize },
}

impl ResizeSpec {
    pub fn target(&self, size: ImageSize) -> Result<ImageSize, ReconstructError> {
        let target = match *self {
            ResizeSpec::Scale(s) => {
                if !(s.is_finite() && s > 0.0) {
                    return Err(ReconstructError::InvalidConfig(format!(
                        "resize scale must be positive (got {s})"
                    )));
                }
                ImageSize::new(
                    (size.width as f64 * s).round() as usize,
                    (size.height as f64 * s).round() as usize,
                )
            }
            ResizeSpec::Size { width, height } => ImageSize::new(width, height),
        };
        if target.width == 0 || target.height == 0 {
            return Err(ReconstructError::InvalidConfig(format!(
                "resize of {}x{} gives an empty image",
                size.width, size.height
            )));
        }
        Ok(target)
    }
}

/// Calibration stage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalibrateConfig {
    /// Detector settings; `chessboard.pattern` fixes the board geometry.
    pub chessboard: ChessboardParams,

    #[serde(default)]
    pub stereo: StereoCalibrationParams,

    /// Free scaling of the rectified views, see `stereo_rectify`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Fewest stereo pairs with the full pattern in both views.
    #[serde(default = "default_min_pairs")]
    pub min_pairs: usize,

    #[serde(default)]
    pub resize: Option<ResizeSpec>,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_min_pairs() -> usize {
    3
}

impl CalibrateConfig {
    pub fn for_pattern(pattern: PatternSpec) -> Self {
        Self {
            chessboard: ChessboardParams::for_pattern(pattern),
            stereo: StereoCalibrationParams::default(),
            alpha: default_alpha(),
            min_pairs: default_min_pairs(),
            resize: None,
        }
    }

    pub fn pattern(&self) -> PatternSpec {
        self.chessboard.pattern
    }
}

/// Which artifacts [`crate::write_outputs`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconstructOutputs {
    pub rectified: bool,
    pub depth_map: bool,
    pub residual_map: bool,
    pub point_cloud: bool,
}

impl Default for ReconstructOutputs {
    fn default() -> Self {
        Self {
            rectified: true,
            depth_map: true,
            residual_map: true,
            point_cloud: true,
        }
    }
}

/// Reconstruction stage settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconstructConfig {
    pub matcher: MatcherKind,
    /// Picks the block size through `windows`; ignored when `disparity` is set.
    pub quality: u32,
    pub windows: QualityWindows,
    pub block_cost: BlockCost,
    /// Full matcher parameters, overriding the quality preset.
    pub disparity: Option<DisparityParams>,
    /// Attach colors from the rectified left view.
    pub colorize: bool,
    pub cloud: WriteOptions,
    pub outputs: ReconstructOutputs,
    pub resize: Option<ResizeSpec>,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherKind::default(),
            quality: 3,
            windows: QualityWindows::default(),
            block_cost: BlockCost::default(),
            disparity: None,
            colorize: true,
            cloud: WriteOptions::default(),
            outputs: ReconstructOutputs::default(),
            resize: None,
        }
    }
}

impl ReconstructConfig {
    pub fn disparity_params(&self) -> DisparityParams {
        self.disparity
            .clone()
            .unwrap_or_else(|| DisparityParams::for_quality(self.matcher, self.quality, &self.windows))
    }
}
